//! Deterministic doubles for the host seams.
//!
//! Each double is a cheap handle over shared state: hand one clone to the
//! code under test and keep another to script and inspect it.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::Mat4;

use crate::completion::{self, Completion, Resolver};
use crate::frame_loop::{FrameRequest, FrameScheduler};
use crate::renderer::{RenderFrame, RenderSurface, SurfaceError};
use crate::tracker::{LocateError, TrackerError, TrackerEventSink, TrackerModule};
use crate::video::{FrameImage, StreamConstraints, VideoError, VideoOpener, VideoStream};

// ============================================================================
// Tracker
// ============================================================================

#[derive(Default)]
struct TrackerScript {
    loads: u32,
    load: Option<Resolver<(), TrackerError>>,
    sink: Option<TrackerEventSink>,
    initialized: Option<(u32, u32, f32)>,
    processed: Vec<(u32, u32)>,
    pose_on_process: Option<[f32; 16]>,
    imu_starts: u32,
    locate_requests: Vec<(f32, f32, u32, u32)>,
    locate: Option<Resolver<(), LocateError>>,
    stops: u32,
}

/// Tracker module driven by the test.
#[derive(Clone, Default)]
pub struct ScriptedTracker {
    script: Rc<RefCell<TrackerScript>>,
}

impl ScriptedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the outstanding `load()`.
    pub fn finish_load(&self, result: Result<(), TrackerError>) {
        let resolver = self.script.borrow_mut().load.take();
        if let Some(resolver) = resolver {
            let _ = resolver.send(result);
        }
    }

    pub fn loads(&self) -> u32 {
        self.script.borrow().loads
    }

    /// Video size and fov passed to `initialize`.
    pub fn initialized(&self) -> Option<(u32, u32, f32)> {
        self.script.borrow().initialized
    }

    pub fn emit_ready(&self) {
        if let Some(sink) = &self.script.borrow().sink {
            sink.ready();
        }
    }

    pub fn emit_permission_request(&self) {
        if let Some(sink) = &self.script.borrow().sink {
            sink.permission_request();
        }
    }

    pub fn emit_pose(&self, pose: &[f32; 16]) {
        self.emit_raw_pose(pose);
    }

    pub fn emit_pose_with_frame(&self, pose: &[f32; 16], frame: FrameImage) {
        if let Some(sink) = &self.script.borrow().sink {
            sink.update(pose, Some(frame));
        }
    }

    /// Emit an update with an arbitrary buffer, well-formed or not.
    pub fn emit_raw_pose(&self, pose: &[f32]) {
        if let Some(sink) = &self.script.borrow().sink {
            sink.update(pose, None);
        }
    }

    /// Emit `pose` from every `process` call.
    pub fn set_pose_on_process(&self, pose: Option<[f32; 16]>) {
        self.script.borrow_mut().pose_on_process = pose;
    }

    pub fn processed(&self) -> Vec<(u32, u32)> {
        self.script.borrow().processed.clone()
    }

    pub fn imu_starts(&self) -> u32 {
        self.script.borrow().imu_starts
    }

    /// Resolve the outstanding `start()`.
    pub fn resolve_locate(&self, result: Result<(), LocateError>) {
        let resolver = self.script.borrow_mut().locate.take();
        if let Some(resolver) = resolver {
            let _ = resolver.send(result);
        }
    }

    pub fn locate_requests(&self) -> Vec<(f32, f32, u32, u32)> {
        self.script.borrow().locate_requests.clone()
    }

    pub fn stops(&self) -> u32 {
        self.script.borrow().stops
    }

    /// Whether the bridge still listens to this module's sink.
    pub fn sink_attached(&self) -> bool {
        self.script
            .borrow()
            .sink
            .as_ref()
            .is_some_and(TrackerEventSink::is_attached)
    }
}

impl TrackerModule for ScriptedTracker {
    fn load(&mut self) -> Completion<(), TrackerError> {
        let (tx, rx) = completion::completion();
        let mut script = self.script.borrow_mut();
        script.loads += 1;
        script.load = Some(tx);
        rx
    }

    fn initialize(&mut self, video: &dyn VideoStream, fov_degrees: f32, sink: TrackerEventSink) {
        let mut script = self.script.borrow_mut();
        script.initialized = Some((video.width(), video.height(), fov_degrees));
        script.sink = Some(sink);
    }

    fn process(&mut self, viewport_width: u32, viewport_height: u32) {
        let mut script = self.script.borrow_mut();
        script.processed.push((viewport_width, viewport_height));
        if let (Some(pose), Some(sink)) = (script.pose_on_process, &script.sink) {
            sink.update(&pose, None);
        }
    }

    fn start_imu(&mut self) {
        self.script.borrow_mut().imu_starts += 1;
    }

    fn start(
        &mut self,
        x: f32,
        y: f32,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Completion<(), LocateError> {
        let (tx, rx) = completion::completion();
        let mut script = self.script.borrow_mut();
        script.locate_requests.push((x, y, viewport_width, viewport_height));
        script.locate = Some(tx);
        rx
    }

    fn stop(&mut self) {
        self.script.borrow_mut().stops += 1;
    }
}

// ============================================================================
// Video
// ============================================================================

/// Stream of a fixed size that counts releases.
#[derive(Debug, Clone)]
pub struct StaticVideo {
    width: u32,
    height: u32,
    releases: Rc<Cell<u32>>,
}

impl StaticVideo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            releases: Rc::new(Cell::new(0)),
        }
    }

    pub fn release_count(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.releases)
    }
}

impl VideoStream for StaticVideo {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn release(&mut self) {
        self.releases.set(self.releases.get() + 1);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Media layer that records requests and answers when told to.
#[derive(Default)]
pub struct ScriptedOpener {
    requests: Vec<StreamConstraints>,
    pending: Option<Resolver<Box<dyn VideoStream>, VideoError>>,
}

impl ScriptedOpener {
    pub fn requests(&self) -> Vec<StreamConstraints> {
        self.requests.clone()
    }

    /// Answer the outstanding request.
    pub fn resolve(&mut self, result: Result<Box<dyn VideoStream>, VideoError>) {
        if let Some(resolver) = self.pending.take() {
            let _ = resolver.send(result);
        }
    }

    /// Drop the outstanding request without answering.
    pub fn drop_pending(&mut self) {
        self.pending = None;
    }
}

impl VideoOpener for ScriptedOpener {
    fn open(&mut self, constraints: &StreamConstraints) -> Completion<Box<dyn VideoStream>, VideoError> {
        let (tx, rx) = completion::completion();
        self.requests.push(*constraints);
        self.pending = Some(tx);
        rx
    }
}

// ============================================================================
// Surface
// ============================================================================

/// What one `draw` call saw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub projection: Mat4,
    pub anchor: Mat4,
    pub anchor_visible: bool,
    pub mesh_count: usize,
}

#[derive(Default)]
struct SurfaceLog {
    resizes: Vec<(u32, u32)>,
    draws: Vec<DrawRecord>,
    video_frames: Vec<(u32, u32)>,
    releases: u32,
    fail_next: Option<SurfaceError>,
}

/// Render surface that records every call.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    log: Rc<RefCell<SurfaceLog>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resizes(&self) -> Vec<(u32, u32)> {
        self.log.borrow().resizes.clone()
    }

    /// Successful draws.
    pub fn draws(&self) -> usize {
        self.log.borrow().draws.len()
    }

    pub fn last_draw(&self) -> Option<DrawRecord> {
        self.log.borrow().draws.last().cloned()
    }

    pub fn video_frames(&self) -> Vec<(u32, u32)> {
        self.log.borrow().video_frames.clone()
    }

    pub fn releases(&self) -> u32 {
        self.log.borrow().releases
    }

    /// Make the next draw fail with `error`.
    pub fn fail_next_draw(&self, error: SurfaceError) {
        self.log.borrow_mut().fail_next = Some(error);
    }
}

impl RenderSurface for RecordingSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.log.borrow_mut().resizes.push((width, height));
    }

    fn present_video_frame(&mut self, frame: &FrameImage) {
        self.log.borrow_mut().video_frames.push((frame.width, frame.height));
    }

    fn draw(&mut self, frame: &RenderFrame<'_>) -> Result<(), SurfaceError> {
        let mut log = self.log.borrow_mut();
        if let Some(error) = log.fail_next.take() {
            return Err(error);
        }
        log.draws.push(DrawRecord {
            projection: frame.projection,
            anchor: frame.anchor,
            anchor_visible: frame.anchor_visible,
            mesh_count: frame.meshes.len(),
        });
        Ok(())
    }

    fn release(&mut self) {
        self.log.borrow_mut().releases += 1;
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Default)]
struct SchedulerLog {
    next: u64,
    requests: Vec<FrameRequest>,
    cancels: Vec<FrameRequest>,
    now: f64,
}

/// Frame scheduler with a hand-advanced clock.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    log: Rc<RefCell<SchedulerLog>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames requested so far.
    pub fn requests(&self) -> usize {
        self.log.borrow().requests.len()
    }

    /// Frames cancelled so far.
    pub fn cancels(&self) -> usize {
        self.log.borrow().cancels.len()
    }

    pub fn advance(&self, seconds: f64) {
        self.log.borrow_mut().now += seconds;
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        let mut log = self.log.borrow_mut();
        log.next += 1;
        let request = FrameRequest(log.next);
        log.requests.push(request);
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        self.log.borrow_mut().cancels.push(request);
    }

    fn now_seconds(&self) -> f64 {
        self.log.borrow().now
    }
}
