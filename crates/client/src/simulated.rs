//! Simulated tracker and synthetic camera for running without hardware.
//!
//! The synthetic camera renders a moving test pattern. The simulated
//! tracker reads frames from it and reports an anchor orbiting slowly in
//! front of the camera, locking onto any point in the middle of the view.

use std::any::Any;
use std::rc::Rc;

use glam::{Mat4, Quat, Vec3};

use poseview_core::completion::{self, Completion};
use poseview_core::{
    FrameImage, LocateError, PoseTransform, StreamConstraints, TrackerError, TrackerEventSink,
    TrackerModule, VideoError, VideoOpener, VideoStream,
};

/// Default synthetic resolution when the constraints leave it open.
const DEFAULT_SIZE: (u32, u32) = (640, 480);

/// Procedural camera image.
#[derive(Debug)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Diagonal stripes drifting with `time` (seconds).
    pub fn frame(&self, time: f32) -> FrameImage {
        let shift = (time * 40.0) as u32;
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize * FrameImage::BYTES_PER_PIXEL);
        for y in 0..self.height {
            for x in 0..self.width {
                let band = ((x + y + shift) / 32) % 2;
                let shade = if band == 0 { 48 } else { 72 };
                pixels.extend_from_slice(&[shade, shade, shade + 16, 255]);
            }
        }
        FrameImage::new(self.width, self.height, pixels)
    }
}

/// Stream over a [`SyntheticCamera`].
pub struct SyntheticVideo {
    camera: Rc<SyntheticCamera>,
    released: bool,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            camera: Rc::new(SyntheticCamera::new(width, height)),
            released: false,
        }
    }

    pub fn camera(&self) -> Rc<SyntheticCamera> {
        Rc::clone(&self.camera)
    }
}

impl VideoStream for SyntheticVideo {
    fn width(&self) -> u32 {
        self.camera.width
    }

    fn height(&self) -> u32 {
        self.camera.height
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            tracing::debug!("Synthetic camera released");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Opens [`SyntheticVideo`] streams. Always succeeds.
#[derive(Debug, Default)]
pub struct SyntheticOpener;

impl VideoOpener for SyntheticOpener {
    fn open(&mut self, constraints: &StreamConstraints) -> Completion<Box<dyn VideoStream>, VideoError> {
        let width = constraints.width.unwrap_or(DEFAULT_SIZE.0);
        let height = constraints.height.unwrap_or(DEFAULT_SIZE.1);
        completion::resolved(Ok(Box::new(SyntheticVideo::new(width, height))))
    }
}

/// Tracker module that fakes tracking output.
pub struct SimulatedTracker {
    require_motion_permission: bool,
    sink: Option<TrackerEventSink>,
    camera: Option<Rc<SyntheticCamera>>,
    frame_rate: f32,
    frames: u64,
}

impl SimulatedTracker {
    /// Pretend frames arrive at this rate.
    const FRAME_RATE: f32 = 60.0;
    /// Orbit radius and distance in front of the camera, in meters.
    const ORBIT_RADIUS: f32 = 0.15;
    const DISTANCE: f32 = 1.2;

    /// `require_motion_permission` makes the tracker ask for IMU access
    /// before reporting ready, like mobile browsers do.
    pub fn new(require_motion_permission: bool) -> Self {
        Self {
            require_motion_permission,
            sink: None,
            camera: None,
            frame_rate: Self::FRAME_RATE,
            frames: 0,
        }
    }

    /// Anchor pose at `time` seconds, row-major.
    pub fn pose_at(time: f32) -> PoseTransform {
        let angle = time * 0.5;
        let translation = Vec3::new(
            Self::ORBIT_RADIUS * angle.cos(),
            -0.2,
            -Self::DISTANCE + Self::ORBIT_RADIUS * angle.sin(),
        );
        let rotation = Quat::from_rotation_y(angle) * Quat::from_rotation_x(0.35);
        PoseTransform::from(Mat4::from_rotation_translation(rotation, translation))
    }

    /// Whether a tap at (`x`, `y`) hits the middle half of the viewport.
    pub fn hits_target(x: f32, y: f32, width: u32, height: u32) -> bool {
        let (w, h) = (width as f32, height as f32);
        (w * 0.25..=w * 0.75).contains(&x) && (h * 0.25..=h * 0.75).contains(&y)
    }
}

impl TrackerModule for SimulatedTracker {
    fn load(&mut self) -> Completion<(), TrackerError> {
        tracing::info!("Simulated tracker loaded");
        completion::resolved(Ok(()))
    }

    fn initialize(&mut self, video: &dyn VideoStream, fov_degrees: f32, sink: TrackerEventSink) {
        tracing::debug!(
            "Simulated tracker on {}x{} video, fov {fov_degrees}",
            video.width(),
            video.height()
        );
        self.camera = video
            .as_any()
            .downcast_ref::<SyntheticVideo>()
            .map(SyntheticVideo::camera);
        if self.require_motion_permission {
            sink.permission_request();
        }
        sink.ready();
        self.sink = Some(sink);
    }

    fn process(&mut self, _viewport_width: u32, _viewport_height: u32) {
        let Some(sink) = &self.sink else {
            return;
        };
        self.frames += 1;
        let time = self.frames as f32 / self.frame_rate;
        let frame = self.camera.as_ref().map(|camera| camera.frame(time));
        sink.update(Self::pose_at(time).values(), frame);
    }

    fn start_imu(&mut self) {
        tracing::info!("Simulated IMU started");
    }

    fn start(&mut self, x: f32, y: f32, viewport_width: u32, viewport_height: u32) -> Completion<(), LocateError> {
        let result = if Self::hits_target(x, y, viewport_width, viewport_height) {
            Ok(())
        } else {
            Err(LocateError::NotFound)
        };
        completion::resolved(result)
    }

    fn stop(&mut self) {
        tracing::debug!("Simulated tracker stopped");
    }
}
