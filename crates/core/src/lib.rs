//! Poseview Core - Pose-Synchronized Overlay Session
//!
//! Platform-free logic for anchoring a 3D object onto a live camera feed
//! using poses from an external tracker. Nothing in this crate touches a
//! GPU, a window or a camera directly; hosts plug those in through the
//! [`RenderSurface`], [`FrameScheduler`], [`VideoOpener`] and
//! [`TrackerModule`] seams.
//!
//! # Execution Rules
//!
//! 1. Single-threaded - everything runs on the host's frame loop
//! 2. No blocking - async work completes through one-shot completions
//!    that the session polls each tick
//! 3. One owner per resource - geometry lives in the session, the canvas
//!    in the renderer, the stream in the video acquisition

pub mod camera;
pub mod completion;
pub mod config;
pub mod frame_loop;
pub mod mesh;
pub mod pose;
pub mod renderer;
pub mod scene;
pub mod session;
pub mod stats;
pub mod tracker;
pub mod ui;
pub mod video;
pub mod viewport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use camera::PerspectiveCamera;
pub use config::{ConfigError, OverlayConfig};
pub use frame_loop::{FrameLoop, FrameRequest, FrameScheduler};
pub use mesh::{MeshBuilder, MeshData, MeshVertex};
pub use pose::{PoseError, PoseTransform};
pub use renderer::{OverlayRenderer, RenderFrame, RenderSurface, SurfaceError};
pub use scene::{AnchorNode, MeshId, MeshNode};
pub use session::{InitBarrier, SessionController, SessionError, SessionEvent, SessionState};
pub use stats::FrameStats;
pub use tracker::{
    LocateError, TrackerBridge, TrackerError, TrackerEvent, TrackerEventSink, TrackerModule,
};
pub use ui::{UiCommand, UiState};
pub use video::{
    ConstraintSupport, FacingMode, FrameImage, StreamConstraints, VideoAcquisition, VideoError,
    VideoOpener, VideoStream,
};
pub use viewport::{Orientation, ViewportGeometry};
