//! Session state machine.
//!
//! Video acquisition, tracker load and renderer construction complete
//! independently and in any order. [`SessionController`] collects them in
//! an [`InitBarrier`], moves to `Ready` once the tracker also reports
//! ready, and from then on routes tracker output to the renderer on every
//! frame-loop tick.

use glam::Mat4;
use thiserror::Error;

use crate::config::OverlayConfig;
use crate::frame_loop::{FrameLoop, FrameScheduler};
use crate::mesh::MeshData;
use crate::renderer::{OverlayRenderer, RenderSurface};
use crate::stats::FrameStats;
use crate::tracker::{LocateError, TrackerBridge, TrackerError, TrackerEvent};
use crate::ui::{UiCommand, UiState};
use crate::video::{ConstraintSupport, VideoAcquisition, VideoError, VideoOpener, VideoStream};
use crate::viewport::ViewportGeometry;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the video stream.
    #[default]
    Idle,
    /// Stream acquired; tracker and renderer coming up.
    Initializing,
    /// Tracker asked for motion sensor access.
    AwaitingMotionPermission,
    /// Tracking available, no target locked.
    Ready,
    /// Target locked; the anchor follows it.
    Located,
    /// Torn down. Terminal.
    Stopped,
}

impl SessionState {
    /// Whether pose updates are applied in this state.
    pub fn accepts_poses(self) -> bool {
        matches!(self, Self::Ready | Self::Located)
    }
}

/// Prerequisites for leaving `Initializing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitBarrier {
    pub video: bool,
    pub tracker_loaded: bool,
    pub renderer: bool,
    pub tracker_ready: bool,
}

impl InitBarrier {
    pub fn is_complete(&self) -> bool {
        self.video && self.tracker_loaded && self.renderer && self.tracker_ready
    }

    /// Names of the prerequisites still outstanding.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (self.video, "video"),
            (self.tracker_loaded, "tracker load"),
            (self.renderer, "renderer"),
            (self.tracker_ready, "tracker ready"),
        ]
        .into_iter()
        .filter_map(|(done, name)| (!done).then_some(name))
        .collect()
    }
}

/// Fatal session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    VideoAcquisition(#[from] VideoError),

    #[error(transparent)]
    TrackerLoad(#[from] TrackerError),
}

/// Inputs a host feeds into the session.
pub enum SessionEvent {
    VideoAcquired(Box<dyn VideoStream>),
    VideoFailed(VideoError),
    SurfaceAttached(Box<dyn RenderSurface>),
    Resized(ViewportGeometry),
    Command(UiCommand),
    Teardown,
}

/// Coordinates video, tracker and renderer for one overlay session.
pub struct SessionController {
    config: OverlayConfig,
    state: SessionState,
    /// State to return to once the motion prompt is answered.
    resume_state: Option<SessionState>,
    geometry: ViewportGeometry,
    barrier: InitBarrier,

    video: VideoAcquisition,
    tracker: TrackerBridge,
    renderer: Option<OverlayRenderer>,
    /// Content attached before the renderer existed.
    pending_content: Vec<(MeshData, Mat4)>,

    scheduler: Box<dyn FrameScheduler>,
    frame_loop: FrameLoop,
    stats: FrameStats,

    error: Option<SessionError>,
    last_locate_error: Option<LocateError>,
    applied_poses: u64,
    discarded_poses: u64,
}

impl SessionController {
    pub fn new(
        config: OverlayConfig,
        geometry: ViewportGeometry,
        tracker: TrackerBridge,
        scheduler: Box<dyn FrameScheduler>,
    ) -> Self {
        let video = VideoAcquisition::new(config.requested(), ConstraintSupport::Exact);
        let stats = FrameStats::new(config.stats_window);
        Self {
            config,
            state: SessionState::Idle,
            resume_state: None,
            geometry,
            barrier: InitBarrier::default(),
            video,
            tracker,
            renderer: None,
            pending_content: Vec::new(),
            scheduler,
            frame_loop: FrameLoop::new(),
            stats,
            error: None,
            last_locate_error: None,
            applied_poses: 0,
            discarded_poses: 0,
        }
    }

    /// Use advisory resolution constraints (iOS-style media layers).
    pub fn with_constraint_support(mut self, support: ConstraintSupport) -> Self {
        self.video = VideoAcquisition::new(self.config.requested(), support);
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the frame loop. Safe to call repeatedly.
    pub fn start(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        self.frame_loop.start(self.scheduler.as_mut());
    }

    /// Request the camera stream for the current geometry.
    pub fn acquire_video(&mut self, opener: &mut dyn VideoOpener) {
        if self.state == SessionState::Stopped {
            return;
        }
        self.video.request(opener, &self.geometry);
    }

    /// Dispatch a host input.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::VideoAcquired(stream) => self.on_video_acquired(stream),
            SessionEvent::VideoFailed(error) => self.on_video_failed(error),
            SessionEvent::SurfaceAttached(surface) => self.attach_surface(surface),
            SessionEvent::Resized(geometry) => self.resize(geometry),
            SessionEvent::Command(command) => self.command(command),
            SessionEvent::Teardown => self.teardown(),
        }
    }

    /// The camera stream is live. Starts the tracker load.
    pub fn on_video_acquired(&mut self, mut stream: Box<dyn VideoStream>) {
        if self.state == SessionState::Stopped || self.video.stream().is_some() {
            tracing::warn!("Discarding late video stream");
            stream.release();
            return;
        }
        self.video.accept(stream);
        self.barrier.video = true;
        if self.state == SessionState::Idle {
            self.state = SessionState::Initializing;
            tracing::info!("Session initializing");
        }
        self.tracker.load();
    }

    pub fn on_video_failed(&mut self, error: VideoError) {
        if self.state == SessionState::Stopped {
            return;
        }
        tracing::error!("Video acquisition failed: {error}");
        self.error = Some(SessionError::VideoAcquisition(error));
    }

    /// Hand the session its render surface, sized to the current geometry.
    pub fn attach_surface(&mut self, mut surface: Box<dyn RenderSurface>) {
        if self.state == SessionState::Stopped {
            tracing::warn!("Discarding render surface after teardown");
            surface.release();
            return;
        }
        if let Some(mut previous) = self.renderer.take() {
            tracing::debug!("Replacing render surface");
            previous.release();
        }

        let mut renderer = OverlayRenderer::new(
            surface,
            &self.config,
            self.geometry.width,
            self.geometry.height,
        );
        for (mesh, local) in self.pending_content.drain(..) {
            renderer.attach(mesh, local);
        }
        self.renderer = Some(renderer);
        self.barrier.renderer = true;
        tracing::info!("Renderer attached");
        self.try_complete_init();
    }

    /// Attach content under the anchor. Attached before the session turns
    /// ready, it replaces the placeholder box.
    pub fn attach_content(&mut self, mesh: MeshData, local: Mat4) {
        match self.renderer.as_mut() {
            Some(renderer) => {
                renderer.attach(mesh, local);
            }
            None => self.pending_content.push((mesh, local)),
        }
    }

    /// Window resized or rotated.
    pub fn resize(&mut self, geometry: ViewportGeometry) {
        tracing::debug!(
            "Viewport {}x{} ({:?})",
            geometry.width,
            geometry.height,
            geometry.orientation
        );
        self.geometry = geometry;
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.resize(geometry.width, geometry.height);
        }
    }

    pub fn command(&mut self, command: UiCommand) {
        match command {
            UiCommand::Tap { x, y } => {
                if self.state == SessionState::AwaitingMotionPermission {
                    self.grant_motion_permission();
                } else if let Err(e) = self.start_locate(x, y) {
                    tracing::debug!("Tap ignored: {e}");
                }
            }
            UiCommand::GrantMotionPermission => self.grant_motion_permission(),
            UiCommand::Stop => self.stop(),
        }
    }

    /// Try to lock onto the target at viewport point (`x`, `y`). The
    /// outcome arrives on a later tick.
    pub fn start_locate(&mut self, x: f32, y: f32) -> Result<(), LocateError> {
        if !self.state.accepts_poses() {
            return Err(LocateError::NotReady);
        }
        self.tracker
            .start_locate(x, y, self.geometry.width, self.geometry.height)
    }

    /// Drop the lock and hide the anchor. Safe from any state.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        self.tracker.stop();
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.hide();
        }
        match self.state {
            SessionState::Located => {
                self.state = SessionState::Ready;
                tracing::info!("Tracking stopped");
            }
            SessionState::AwaitingMotionPermission
                if self.resume_state == Some(SessionState::Located) =>
            {
                self.resume_state = Some(SessionState::Ready);
            }
            _ => {}
        }
        self.stats.reset_window();
    }

    /// Answer the motion prompt: start the IMU and resume.
    pub fn grant_motion_permission(&mut self) {
        if self.state != SessionState::AwaitingMotionPermission {
            return;
        }
        self.tracker.start_imu();
        self.state = self.resume_state.take().unwrap_or(SessionState::Initializing);
        tracing::info!("Motion permission granted, resuming {:?}", self.state);
        self.try_complete_init();
    }

    /// Release everything. Terminal and idempotent.
    pub fn teardown(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        self.frame_loop.cancel(self.scheduler.as_mut());
        self.tracker.stop();
        self.tracker.detach();
        self.video.release();
        if let Some(mut renderer) = self.renderer.take() {
            renderer.release();
        }
        self.pending_content.clear();
        self.resume_state = None;
        self.state = SessionState::Stopped;
        tracing::info!("Session stopped after {} ticks", self.frame_loop.ticks());
    }

    // ========================================================================
    // Frame loop
    // ========================================================================

    /// One frame-loop tick. Called by the host when its scheduled frame
    /// fires; spurious calls are ignored.
    pub fn tick(&mut self) {
        if !self.frame_loop.begin_tick() {
            return;
        }
        tracing::trace!("Tick {} in {:?}", self.frame_loop.ticks(), self.state);

        self.pump();

        if self.state.accepts_poses() {
            self.tracker
                .process(self.geometry.width, self.geometry.height);
            self.dispatch_tracker_events();
        }

        self.frame_loop.schedule(self.scheduler.as_mut());
    }

    /// Drain async completions and queued tracker events.
    pub fn pump(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }

        match self.video.poll() {
            Some(Ok(stream)) => self.on_video_acquired(stream),
            Some(Err(e)) => self.on_video_failed(e),
            None => {}
        }

        match self.tracker.poll_load() {
            Some(Ok(())) => self.on_tracker_loaded(),
            Some(Err(e)) => {
                tracing::error!("Tracker load failed: {e}");
                self.error = Some(SessionError::TrackerLoad(e));
            }
            None => {}
        }

        if let Some(result) = self.tracker.poll_locate() {
            self.on_locate_result(result);
        }

        self.dispatch_tracker_events();
    }

    fn on_tracker_loaded(&mut self) {
        self.barrier.tracker_loaded = true;
        match self.video.stream() {
            Some(stream) => self.tracker.initialize(stream, self.config.fov_degrees),
            None => tracing::warn!("Tracker loaded without a video stream"),
        }
    }

    fn on_locate_result(&mut self, result: Result<(), LocateError>) {
        match result {
            Ok(()) => {
                self.last_locate_error = None;
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.show();
                }
                match self.state {
                    SessionState::Ready => self.state = SessionState::Located,
                    SessionState::AwaitingMotionPermission => {
                        self.resume_state = Some(SessionState::Located)
                    }
                    _ => {}
                }
                tracing::info!("Target located");
            }
            Err(e) => {
                tracing::warn!("Locate failed: {e}");
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.hide();
                }
                self.last_locate_error = Some(e);
            }
        }
    }

    fn dispatch_tracker_events(&mut self) {
        for event in self.tracker.poll_events() {
            match event {
                TrackerEvent::Ready => {
                    tracing::info!("Tracker ready");
                    self.barrier.tracker_ready = true;
                    self.try_complete_init();
                }
                TrackerEvent::PermissionRequest => self.on_permission_request(),
                TrackerEvent::PoseUpdate { pose, frame } => {
                    let renderer = match self.renderer.as_mut() {
                        Some(renderer) if self.state.accepts_poses() => renderer,
                        _ => {
                            tracing::trace!("Discarding pose in {:?}", self.state);
                            self.discarded_poses += 1;
                            continue;
                        }
                    };
                    if let Some(frame) = &frame {
                        renderer.present_video_frame(frame);
                    }
                    renderer.apply_pose(&pose);
                    self.applied_poses += 1;
                    self.stats.record(self.scheduler.now_seconds());
                }
            }
        }
    }

    fn on_permission_request(&mut self) {
        match self.state {
            SessionState::Initializing | SessionState::Ready | SessionState::Located => {
                tracing::info!("Tracker requests motion permission");
                self.resume_state = Some(self.state);
                self.state = SessionState::AwaitingMotionPermission;
            }
            state => tracing::debug!("Ignoring permission request in {state:?}"),
        }
    }

    fn try_complete_init(&mut self) {
        if self.state != SessionState::Initializing {
            return;
        }
        if !self.barrier.is_complete() {
            tracing::debug!("Waiting for {:?}", self.barrier.missing());
            return;
        }

        if let (Some(renderer), Some((width, height))) =
            (self.renderer.as_mut(), self.video.dimensions())
        {
            renderer.ensure_content(width, height, &self.config);
        }
        self.state = SessionState::Ready;
        tracing::info!("Session ready");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn geometry(&self) -> ViewportGeometry {
        self.geometry
    }

    pub fn barrier(&self) -> &InitBarrier {
        &self.barrier
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Fatal initialization error, if any.
    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn last_locate_error(&self) -> Option<&LocateError> {
        self.last_locate_error.as_ref()
    }

    pub fn renderer(&self) -> Option<&OverlayRenderer> {
        self.renderer.as_ref()
    }

    pub fn tracker(&self) -> &TrackerBridge {
        &self.tracker
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Executed frame-loop ticks.
    pub fn ticks(&self) -> u64 {
        self.frame_loop.ticks()
    }

    pub fn applied_poses(&self) -> u64 {
        self.applied_poses
    }

    pub fn discarded_poses(&self) -> u64 {
        self.discarded_poses
    }

    /// What the status overlay should show.
    pub fn ui(&self) -> UiState {
        UiState {
            initializing: matches!(self.state, SessionState::Idle | SessionState::Initializing)
                && self.error.is_none(),
            permission_prompt: self.state == SessionState::AwaitingMotionPermission,
            tap_to_locate: self.state == SessionState::Ready,
            stop_button: self.state == SessionState::Located,
            error: self.error.as_ref().map(ToString::to_string),
            locate_error: self.last_locate_error.as_ref().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::PoseTransform;
    use crate::testing::{ManualScheduler, RecordingSurface, ScriptedOpener, ScriptedTracker, StaticVideo};
    use crate::video::StreamConstraints;
    use crate::viewport::Orientation;

    struct Harness {
        session: SessionController,
        tracker: ScriptedTracker,
        surface: RecordingSurface,
        scheduler: ManualScheduler,
        opener: ScriptedOpener,
        video_releases: std::rc::Rc<std::cell::Cell<u32>>,
    }

    fn harness(width: u32, height: u32) -> Harness {
        let tracker = ScriptedTracker::new();
        let scheduler = ManualScheduler::new();
        let session = SessionController::new(
            OverlayConfig::default(),
            ViewportGeometry::from_dimensions(width, height),
            TrackerBridge::new(Box::new(tracker.clone())),
            Box::new(scheduler.clone()),
        );
        Harness {
            session,
            tracker,
            surface: RecordingSurface::new(),
            scheduler,
            opener: ScriptedOpener::default(),
            video_releases: Default::default(),
        }
    }

    /// Video acquired, tracker loaded and initialized, renderer attached.
    fn initializing(width: u32, height: u32) -> Harness {
        let mut h = harness(width, height);
        h.session.start();
        h.session.acquire_video(&mut h.opener);
        let video = StaticVideo::new(640, 480);
        h.video_releases = video.release_count();
        h.opener.resolve(Ok(Box::new(video)));
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::Initializing);

        h.tracker.finish_load(Ok(()));
        h.session.attach_surface(Box::new(h.surface.clone()));
        h.session.tick();
        assert_eq!(h.tracker.initialized(), Some((640, 480, 60.0)));
        h
    }

    fn ready(width: u32, height: u32) -> Harness {
        let mut h = initializing(width, height);
        h.tracker.emit_ready();
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::Ready);
        h
    }

    fn located() -> Harness {
        let mut h = ready(640, 480);
        h.session.start_locate(320.0, 240.0).unwrap();
        h.tracker.resolve_locate(Ok(()));
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::Located);
        h
    }

    fn pose(tag: f32) -> [f32; 16] {
        let mut values = *PoseTransform::IDENTITY.values();
        values[11] = tag;
        values
    }

    fn anchor_visible(h: &Harness) -> bool {
        h.session.renderer().is_some_and(OverlayRenderer::is_visible)
    }

    #[test]
    fn barrier_waits_for_every_prerequisite() {
        let mut h = harness(640, 480);
        h.session.start();
        h.session.acquire_video(&mut h.opener);
        h.opener.resolve(Ok(Box::new(StaticVideo::new(640, 480))));
        h.session.tick();
        h.tracker.finish_load(Ok(()));
        h.session.tick();

        // Tracker ready before the renderer exists.
        h.tracker.emit_ready();
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::Initializing);
        assert_eq!(h.session.barrier().missing(), vec!["renderer"]);
        assert!(h.session.ui().initializing);

        h.session.attach_surface(Box::new(h.surface.clone()));
        assert_eq!(h.session.state(), SessionState::Ready);
        assert!(!h.session.ui().initializing);
        assert!(h.session.ui().tap_to_locate);
    }

    #[test]
    fn placeholder_is_added_on_ready() {
        let h = ready(640, 480);
        let renderer = h.session.renderer().unwrap();
        assert_eq!(renderer.anchor().children().len(), 1);
        assert!(!renderer.is_visible());
    }

    #[test]
    fn content_attached_early_replaces_placeholder() {
        let mut h = harness(640, 480);
        h.session.attach_content(MeshData::default(), Mat4::IDENTITY);
        h.session.attach_surface(Box::new(h.surface.clone()));
        let renderer = h.session.renderer().unwrap();
        assert_eq!(renderer.anchor().children().len(), 1);
        assert!(renderer.anchor().children()[0].mesh.is_empty());
    }

    #[test]
    fn poses_are_gated_on_state() {
        let mut h = initializing(640, 480);
        h.tracker.emit_pose(&pose(-1.0));
        h.session.tick();
        assert_eq!(h.session.discarded_poses(), 1);
        assert_eq!(h.session.applied_poses(), 0);
        assert_eq!(h.surface.draws(), 0);

        h.tracker.emit_ready();
        h.session.tick();
        h.tracker.emit_pose(&pose(-2.0));
        h.session.tick();
        assert_eq!(h.session.applied_poses(), 1);
        let anchor = h.session.renderer().unwrap().anchor().matrix();
        assert_eq!(anchor.values()[11], -2.0);
    }

    #[test]
    fn process_runs_only_when_ready() {
        let mut h = initializing(640, 480);
        h.session.tick();
        assert!(h.tracker.processed().is_empty());

        h.tracker.emit_ready();
        h.session.tick();
        h.session.tick();
        assert_eq!(h.tracker.processed(), vec![(640, 480), (640, 480)]);
    }

    #[test]
    fn processed_pose_is_applied_the_same_tick() {
        let mut h = ready(640, 480);
        h.tracker.set_pose_on_process(Some(pose(-3.0)));
        h.session.tick();
        assert_eq!(h.session.applied_poses(), 1);
        assert_eq!(h.surface.last_draw().unwrap().anchor.w_axis.z, -3.0);
    }

    #[test]
    fn pose_round_trip_is_bit_identical() {
        let mut h = located();
        let values: [f32; 16] = std::array::from_fn(|i| (i as f32 + 0.1) / 3.0);
        h.tracker.emit_pose(&values);
        h.session.tick();

        let stored = h.session.renderer().unwrap().anchor().matrix().values();
        assert!(stored.iter().zip(values.iter()).all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn video_frame_reaches_surface() {
        let mut h = ready(640, 480);
        h.tracker
            .emit_pose_with_frame(&pose(-1.0), crate::video::FrameImage::new(2, 1, vec![0; 8]));
        h.session.tick();
        assert_eq!(h.surface.video_frames(), vec![(2, 1)]);
    }

    #[test]
    fn locate_success_shows_anchor() {
        let mut h = ready(640, 480);
        h.session.start_locate(320.0, 240.0).unwrap();
        assert_eq!(h.tracker.locate_requests(), vec![(320.0, 240.0, 640, 480)]);
        assert_eq!(h.session.state(), SessionState::Ready);

        h.tracker.resolve_locate(Ok(()));
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::Located);
        assert!(anchor_visible(&h));
        assert!(h.session.ui().stop_button);
    }

    #[test]
    fn locate_failure_is_recoverable() {
        let mut h = ready(640, 480);
        h.session.command(UiCommand::Tap { x: 10.0, y: 10.0 });
        h.tracker.resolve_locate(Err(LocateError::NotFound));
        h.session.tick();

        assert_eq!(h.session.state(), SessionState::Ready);
        assert!(!anchor_visible(&h));
        assert_eq!(h.session.last_locate_error(), Some(&LocateError::NotFound));
        assert_eq!(
            h.session.ui().locate_error.as_deref(),
            Some("target could not be located")
        );

        // The loop keeps running and a retry is accepted.
        h.session.tick();
        assert!(h.session.start_locate(20.0, 20.0).is_ok());
    }

    #[test]
    fn locate_while_located_is_rejected() {
        let mut h = located();
        assert_eq!(
            h.session.start_locate(1.0, 1.0),
            Err(LocateError::AlreadyTracking)
        );
        assert_eq!(h.tracker.locate_requests().len(), 1);
    }

    #[test]
    fn locate_before_ready_is_rejected() {
        let mut h = initializing(640, 480);
        assert_eq!(h.session.start_locate(1.0, 1.0), Err(LocateError::NotReady));
        assert!(h.tracker.locate_requests().is_empty());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut h = located();
        h.session.stop();
        h.session.stop();
        h.session.command(UiCommand::Stop);

        assert_eq!(h.session.state(), SessionState::Ready);
        assert!(!anchor_visible(&h));
        assert_eq!(h.tracker.stops(), 1);

        // No pose reaches the anchor until the next lock.
        h.tracker.emit_pose(&pose(-5.0));
        h.session.tick();
        assert_eq!(h.session.applied_poses(), 0);
    }

    #[test]
    fn stop_redraws_without_anchor() {
        let mut h = located();
        h.tracker.set_pose_on_process(Some(pose(-1.0)));
        h.session.tick();
        let draws = h.surface.draws();
        assert!(h.surface.last_draw().unwrap().anchor_visible);

        h.session.stop();
        for _ in 0..5 {
            h.session.tick();
        }
        assert_eq!(h.surface.draws(), draws + 1);
        assert!(!h.surface.last_draw().unwrap().anchor_visible);
    }

    #[test]
    fn stop_while_locate_pending_ignores_late_lock() {
        let mut h = ready(640, 480);
        h.session.start_locate(320.0, 240.0).unwrap();
        h.session.stop();
        assert_eq!(h.tracker.stops(), 1);

        h.tracker.resolve_locate(Ok(()));
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::Ready);
        assert!(!anchor_visible(&h));

        h.tracker.emit_pose(&pose(-3.0));
        h.session.tick();
        assert_eq!(h.session.applied_poses(), 0);

        // A fresh locate is accepted and unblocks poses.
        h.session.start_locate(320.0, 240.0).unwrap();
        h.tracker.resolve_locate(Ok(()));
        h.tracker.emit_pose(&pose(-4.0));
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::Located);
        assert_eq!(h.session.applied_poses(), 1);
    }

    #[test]
    fn permission_prompt_while_located_resumes_tracking() {
        let mut h = located();
        h.tracker.emit_permission_request();
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::AwaitingMotionPermission);
        assert!(h.session.ui().permission_prompt);

        h.tracker.emit_pose(&pose(-1.0));
        h.session.tick();
        assert_eq!(h.session.applied_poses(), 0);

        h.session.command(UiCommand::GrantMotionPermission);
        assert_eq!(h.tracker.imu_starts(), 1);
        assert_eq!(h.session.state(), SessionState::Located);
        assert!(anchor_visible(&h));

        h.tracker.emit_pose(&pose(-2.0));
        h.session.tick();
        assert_eq!(h.session.applied_poses(), 1);
    }

    #[test]
    fn stop_during_prompt_resumes_ready() {
        let mut h = located();
        h.tracker.emit_permission_request();
        h.session.tick();
        h.session.stop();
        assert!(!anchor_visible(&h));

        h.session.command(UiCommand::GrantMotionPermission);
        assert_eq!(h.session.state(), SessionState::Ready);
    }

    #[test]
    fn permission_prompt_resumes_prior_state() {
        let mut h = initializing(640, 480);
        h.tracker.emit_permission_request();
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::AwaitingMotionPermission);
        assert!(h.session.ui().permission_prompt);

        // Ready arrives while the prompt is up.
        h.tracker.emit_ready();
        h.session.tick();
        assert_eq!(h.session.state(), SessionState::AwaitingMotionPermission);

        h.session.command(UiCommand::Tap { x: 0.0, y: 0.0 });
        assert_eq!(h.tracker.imu_starts(), 1);
        assert_eq!(h.session.state(), SessionState::Ready);
        assert!(h.tracker.locate_requests().is_empty());
    }

    #[test]
    fn permission_prompt_from_ready() {
        let mut h = ready(640, 480);
        h.tracker.emit_permission_request();
        h.session.tick();
        h.tracker.emit_pose(&pose(-1.0));
        h.session.tick();
        assert_eq!(h.session.discarded_poses(), 1);

        h.session.command(UiCommand::GrantMotionPermission);
        assert_eq!(h.session.state(), SessionState::Ready);
    }

    #[test]
    fn resize_updates_renderer_projection() {
        let mut h = ready(800, 600);
        let aspect = |h: &Harness| h.session.renderer().unwrap().camera().aspect();
        assert_eq!(aspect(&h), 800.0 / 600.0);

        h.session.resize(ViewportGeometry::from_dimensions(600, 800));
        assert_eq!(aspect(&h), 600.0 / 800.0);
        assert_eq!(h.session.renderer().unwrap().canvas_size(), (600, 800));
        assert_eq!(h.session.geometry().orientation, Orientation::Portrait);
        assert_eq!(h.surface.resizes().last(), Some(&(600, 800)));

        h.session.tick();
        assert_eq!(h.tracker.processed().last(), Some(&(600, 800)));
    }

    #[test]
    fn resize_before_renderer_is_recorded() {
        let mut h = harness(800, 600);
        h.session.resize(ViewportGeometry::from_dimensions(600, 800));
        assert_eq!(h.session.geometry().width, 600);

        h.session.attach_surface(Box::new(h.surface.clone()));
        assert_eq!(h.surface.resizes(), vec![(600, 800)]);
    }

    #[test]
    fn video_constraints_follow_orientation() {
        let mut landscape = harness(800, 600);
        landscape.session.acquire_video(&mut landscape.opener);
        let c = landscape.opener.requests()[0];
        assert_eq!((c.width, c.height), (Some(640), Some(480)));

        let mut portrait = harness(600, 800);
        portrait.session.acquire_video(&mut portrait.opener);
        let c: StreamConstraints = portrait.opener.requests()[0];
        assert_eq!((c.width, c.height), (Some(480), Some(640)));
    }

    #[test]
    fn video_failure_is_fatal() {
        let mut h = harness(640, 480);
        h.session.start();
        h.session.acquire_video(&mut h.opener);
        h.opener.resolve(Err(VideoError::Denied("NotAllowedError".into())));
        h.session.tick();

        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(matches!(h.session.error(), Some(SessionError::VideoAcquisition(_))));
        let ui = h.session.ui();
        assert!(!ui.initializing);
        assert_eq!(ui.error.as_deref(), Some("camera access denied: NotAllowedError"));
    }

    #[test]
    fn tracker_load_failure_is_fatal() {
        let mut h = harness(640, 480);
        h.session.start();
        h.session.acquire_video(&mut h.opener);
        h.opener.resolve(Ok(Box::new(StaticVideo::new(640, 480))));
        h.session.tick();
        h.tracker.finish_load(Err(TrackerError::Load("404".into())));
        h.session.tick();

        assert_eq!(h.session.state(), SessionState::Initializing);
        assert_eq!(
            h.session.error(),
            Some(&SessionError::TrackerLoad(TrackerError::Load("404".into())))
        );
        assert!(h.tracker.initialized().is_none());
    }

    #[test]
    fn frame_loop_is_never_doubled() {
        let mut h = harness(640, 480);
        h.session.start();
        h.session.start();
        assert_eq!(h.scheduler.requests(), 1);

        h.session.tick();
        h.session.tick();
        h.session.tick();
        assert_eq!(h.session.ticks(), 3);
        assert_eq!(h.scheduler.requests(), 4);
    }

    #[test]
    fn teardown_releases_once() {
        let mut h = located();
        h.session.teardown();
        h.session.handle(SessionEvent::Teardown);

        assert_eq!(h.session.state(), SessionState::Stopped);
        assert_eq!(h.scheduler.cancels(), 1);
        assert_eq!(h.surface.releases(), 1);
        assert_eq!(h.video_releases.get(), 1);
        assert_eq!(h.tracker.stops(), 1);
        assert!(!h.tracker.sink_attached());

        // Late callbacks go nowhere.
        let ticks = h.session.ticks();
        h.tracker.emit_pose(&pose(-1.0));
        h.session.tick();
        assert_eq!(h.session.ticks(), ticks);
        assert_eq!(h.session.applied_poses(), 0);
    }

    #[test]
    fn late_resources_are_released_after_teardown() {
        let mut h = harness(640, 480);
        h.session.teardown();

        let late_surface = RecordingSurface::new();
        h.session.attach_surface(Box::new(late_surface.clone()));
        assert_eq!(late_surface.releases(), 1);
        assert!(h.session.renderer().is_none());

        let video = StaticVideo::new(640, 480);
        let released = video.release_count();
        h.session.handle(SessionEvent::VideoAcquired(Box::new(video)));
        assert_eq!(released.get(), 1);
        assert_eq!(h.session.state(), SessionState::Stopped);
    }

    #[test]
    fn stats_count_applied_poses() {
        let mut h = located();
        for _ in 0..3 {
            h.scheduler.advance(0.5);
            h.tracker.emit_pose(&pose(-1.0));
            h.session.tick();
        }
        assert_eq!(h.session.stats().frames(), 3);
    }
}
