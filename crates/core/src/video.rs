//! Video acquisition: stream constraints and the acquired stream.
//!
//! The platform media layer is a collaborator. This module decides which
//! constraints to ask for, holds the request while it is in flight and
//! owns the stream once it arrives.

use std::any::Any;

use thiserror::Error;

use crate::completion::{self, Completion, Poll};
use crate::viewport::{Orientation, ViewportGeometry};

/// Error raised by the platform when a stream cannot be opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoError {
    #[error("camera access denied: {0}")]
    Denied(String),

    #[error("no camera matches the constraints: {0}")]
    Unsatisfiable(String),

    #[error("could not initialize video stream: {0}")]
    Other(String),

    #[error("video request was dropped before completing")]
    Dropped,
}

/// How strictly the platform honors resolution constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstraintSupport {
    /// Exact width/height are honored.
    #[default]
    Exact,
    /// Resolution constraints are advisory only (iOS). A frame rate is
    /// requested instead.
    Advisory,
}

/// Which camera to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    #[default]
    Environment,
    User,
}

impl FacingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::User => "user",
        }
    }
}

/// Constraints handed to the media layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<u32>,
    pub facing_mode: FacingMode,
}

impl StreamConstraints {
    /// Frame rate requested where resolution is advisory.
    pub const ADVISORY_FRAME_RATE: u32 = 60;

    /// Pick constraints for the current orientation.
    ///
    /// Landscape asks for `requested` as given, portrait swaps it, and an
    /// unknown orientation keeps the request unchanged.
    pub fn select(
        orientation: Orientation,
        requested: (u32, u32),
        support: ConstraintSupport,
    ) -> Self {
        let (width, height) = match orientation {
            Orientation::Landscape | Orientation::Unknown => requested,
            Orientation::Portrait => (requested.1, requested.0),
        };

        match support {
            ConstraintSupport::Exact => Self {
                width: Some(width),
                height: Some(height),
                frame_rate: None,
                facing_mode: FacingMode::Environment,
            },
            ConstraintSupport::Advisory => Self {
                width: None,
                height: None,
                frame_rate: Some(Self::ADVISORY_FRAME_RATE),
                facing_mode: FacingMode::Environment,
            },
        }
    }
}

/// Raw RGBA8 pixels for video pass-through. Lives for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl FrameImage {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// True when the buffer holds exactly `width * height` pixels.
    pub fn is_complete(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }
}

/// An open camera stream.
pub trait VideoStream {
    /// Native frame width in pixels.
    fn width(&self) -> u32;

    /// Native frame height in pixels.
    fn height(&self) -> u32;

    /// Stop capture and free the device. Called once, at teardown.
    fn release(&mut self);

    /// Platform handle for tracker modules that read frames directly.
    fn as_any(&self) -> &dyn Any;
}

/// Platform media layer.
pub trait VideoOpener {
    fn open(&mut self, constraints: &StreamConstraints) -> Completion<Box<dyn VideoStream>, VideoError>;
}

/// Owns the stream request and, once acquired, the stream itself.
pub struct VideoAcquisition {
    requested: (u32, u32),
    support: ConstraintSupport,
    pending: Option<Completion<Box<dyn VideoStream>, VideoError>>,
    stream: Option<Box<dyn VideoStream>>,
    released: bool,
}

impl VideoAcquisition {
    pub fn new(requested: (u32, u32), support: ConstraintSupport) -> Self {
        Self {
            requested,
            support,
            pending: None,
            stream: None,
            released: false,
        }
    }

    /// Constraints for the given geometry.
    pub fn constraints(&self, geometry: &ViewportGeometry) -> StreamConstraints {
        StreamConstraints::select(geometry.orientation, self.requested, self.support)
    }

    /// Ask the platform for a stream. No-op while a request is in flight
    /// or a stream is already held.
    pub fn request(&mut self, opener: &mut dyn VideoOpener, geometry: &ViewportGeometry) -> bool {
        if self.pending.is_some() || self.stream.is_some() || self.released {
            return false;
        }
        let constraints = self.constraints(geometry);
        tracing::info!("Requesting video stream: {constraints:?}");
        self.pending = Some(opener.open(&constraints));
        true
    }

    /// Poll the in-flight request.
    pub fn poll(&mut self) -> Option<Result<Box<dyn VideoStream>, VideoError>> {
        match completion::poll_slot(&mut self.pending)? {
            Poll::Pending => None,
            Poll::Ready(result) => Some(result),
            Poll::Dropped => Some(Err(VideoError::Dropped)),
        }
    }

    /// Take ownership of an acquired stream.
    pub fn accept(&mut self, stream: Box<dyn VideoStream>) {
        tracing::info!("Video stream ready: {}x{}", stream.width(), stream.height());
        self.pending = None;
        self.stream = Some(stream);
    }

    pub fn stream(&self) -> Option<&dyn VideoStream> {
        self.stream.as_deref()
    }

    /// Native size of the held stream.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.stream.as_ref().map(|s| (s.width(), s.height()))
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Release the device. Safe to call repeatedly.
    pub fn release(&mut self) {
        self.pending = None;
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            tracing::info!("Video stream released");
        }
        self.released = true;
    }
}
