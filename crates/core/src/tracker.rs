//! Bridge between an external tracker module and the session.
//!
//! The module reports through a [`TrackerEventSink`]; the bridge turns
//! those reports into an ordered queue of [`TrackerEvent`]s and guards the
//! command surface (locate, IMU start, stop).

use futures::channel::mpsc;
use thiserror::Error;

use crate::completion::{self, Completion, Poll};
use crate::pose::PoseTransform;
use crate::video::{FrameImage, VideoStream};

/// Events from the tracker, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// Tracker finished initializing and can process frames.
    Ready,
    /// Tracker needs the user to grant motion sensor access.
    PermissionRequest,
    /// New anchor pose for the current frame, with an optional camera
    /// frame for pass-through.
    PoseUpdate {
        pose: PoseTransform,
        frame: Option<FrameImage>,
    },
}

/// Why a locate attempt did not produce a lock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("target could not be located")]
    NotFound,

    #[error("already tracking a located target")]
    AlreadyTracking,

    #[error("a locate request is already pending")]
    Pending,

    #[error("tracker is not ready")]
    NotReady,

    #[error("locate request was dropped by the tracker")]
    Dropped,
}

/// Tracker module failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("tracker module failed to load: {0}")]
    Load(String),

    #[error("tracker module load was dropped before completing")]
    Dropped,
}

/// Where a tracker module sends its callbacks.
///
/// Sending after the bridge has detached is a silent no-op.
#[derive(Debug, Clone)]
pub struct TrackerEventSink {
    tx: mpsc::UnboundedSender<TrackerEvent>,
}

impl TrackerEventSink {
    pub fn ready(&self) {
        self.emit(TrackerEvent::Ready);
    }

    pub fn permission_request(&self) {
        self.emit(TrackerEvent::PermissionRequest);
    }

    /// Report a pose. `pose` is only borrowed for this call; the values
    /// are copied before the module gets its buffer back.
    pub fn update(&self, pose: &[f32], frame: Option<FrameImage>) {
        match PoseTransform::from_slice(pose) {
            Ok(pose) => self.emit(TrackerEvent::PoseUpdate { pose, frame }),
            Err(e) => tracing::warn!("Dropping malformed tracker update: {e}"),
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.tx.is_closed()
    }

    fn emit(&self, event: TrackerEvent) {
        let _ = self.tx.unbounded_send(event);
    }
}

/// The external tracking capability.
pub trait TrackerModule {
    /// Fetch and compile the module.
    fn load(&mut self) -> Completion<(), TrackerError>;

    /// Bind the module to a video source. Lifecycle callbacks go to `sink`.
    fn initialize(&mut self, video: &dyn VideoStream, fov_degrees: f32, sink: TrackerEventSink);

    /// Process the current camera frame for the given viewport. Emits at
    /// most one pose update through the sink.
    fn process(&mut self, viewport_width: u32, viewport_height: u32);

    /// Start inertial sensors after the user granted access.
    fn start_imu(&mut self);

    /// Try to lock onto the target under the viewport point (`x`, `y`).
    fn start(&mut self, x: f32, y: f32, viewport_width: u32, viewport_height: u32)
        -> Completion<(), LocateError>;

    /// Drop the current lock.
    fn stop(&mut self);
}

enum LocateState {
    Idle,
    Pending(Completion<(), LocateError>),
    Located,
}

/// Owns a tracker module and normalizes its surface.
pub struct TrackerBridge {
    module: Box<dyn TrackerModule>,
    load: Option<Completion<(), TrackerError>>,
    load_requested: bool,
    loaded: bool,
    events: Option<mpsc::UnboundedReceiver<TrackerEvent>>,
    locate: LocateState,
    /// Set by `stop()`; cleared by the next successful locate.
    suppress_updates: bool,
}

impl TrackerBridge {
    pub fn new(module: Box<dyn TrackerModule>) -> Self {
        Self {
            module,
            load: None,
            load_requested: false,
            loaded: false,
            events: None,
            locate: LocateState::Idle,
            suppress_updates: false,
        }
    }

    /// Start loading the module. Only the first call reaches the module.
    pub fn load(&mut self) {
        if self.load_requested {
            return;
        }
        self.load_requested = true;
        tracing::info!("Loading tracker module");
        self.load = Some(self.module.load());
    }

    /// Poll the module load.
    pub fn poll_load(&mut self) -> Option<Result<(), TrackerError>> {
        let result = match completion::poll_slot(&mut self.load)? {
            Poll::Pending => return None,
            Poll::Ready(result) => result,
            Poll::Dropped => Err(TrackerError::Dropped),
        };
        self.loaded = result.is_ok();
        Some(result)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_subscribed(&self) -> bool {
        self.events.is_some()
    }

    /// Subscribe to the module's events and bind it to `video`.
    pub fn initialize(&mut self, video: &dyn VideoStream, fov_degrees: f32) {
        if self.events.is_some() {
            tracing::debug!("Tracker already initialized");
            return;
        }
        let (tx, rx) = mpsc::unbounded();
        self.events = Some(rx);
        tracing::info!(
            "Initializing tracker: video {}x{}, fov {fov_degrees}",
            video.width(),
            video.height()
        );
        self.module
            .initialize(video, fov_degrees, TrackerEventSink { tx });
    }

    /// Drive one tracker frame.
    pub fn process(&mut self, viewport_width: u32, viewport_height: u32) {
        if self.events.is_some() {
            self.module.process(viewport_width, viewport_height);
        }
    }

    /// Drain queued events in emission order.
    pub fn poll_events(&mut self) -> Vec<TrackerEvent> {
        let Some(rx) = self.events.as_mut() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        while let Ok(Some(event)) = rx.try_next() {
            if self.suppress_updates && matches!(event, TrackerEvent::PoseUpdate { .. }) {
                tracing::trace!("Dropping pose update after stop");
                continue;
            }
            events.push(event);
        }
        events
    }

    pub fn start_imu(&mut self) {
        tracing::info!("Starting IMU");
        self.module.start_imu();
    }

    /// Ask the module to lock onto the point (`x`, `y`).
    ///
    /// Rejected without reaching the module while a lock is held or a
    /// request is already pending.
    pub fn start_locate(
        &mut self,
        x: f32,
        y: f32,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Result<(), LocateError> {
        match self.locate {
            LocateState::Located => return Err(LocateError::AlreadyTracking),
            LocateState::Pending(_) => return Err(LocateError::Pending),
            LocateState::Idle => {}
        }
        if self.events.is_none() {
            return Err(LocateError::NotReady);
        }

        tracing::info!("Locating target at ({x}, {y}) in {viewport_width}x{viewport_height}");
        let pending = self.module.start(x, y, viewport_width, viewport_height);
        self.locate = LocateState::Pending(pending);
        Ok(())
    }

    /// Poll a pending locate.
    pub fn poll_locate(&mut self) -> Option<Result<(), LocateError>> {
        let LocateState::Pending(pending) = &mut self.locate else {
            return None;
        };
        let result = match pending.try_recv() {
            Ok(None) => return None,
            Ok(Some(result)) => result,
            Err(_) => Err(LocateError::Dropped),
        };

        match result {
            Ok(()) => {
                self.locate = LocateState::Located;
                self.suppress_updates = false;
            }
            Err(_) => self.locate = LocateState::Idle,
        }
        Some(result)
    }

    pub fn is_located(&self) -> bool {
        matches!(self.locate, LocateState::Located)
    }

    pub fn is_locate_pending(&self) -> bool {
        matches!(self.locate, LocateState::Pending(_))
    }

    /// Drop the lock. Safe from any state; the module only hears about it
    /// when a lock was held or requested.
    pub fn stop(&mut self) {
        self.suppress_updates = true;
        match std::mem::replace(&mut self.locate, LocateState::Idle) {
            LocateState::Idle => tracing::debug!("Tracker stop with nothing to stop"),
            LocateState::Pending(_) | LocateState::Located => {
                tracing::info!("Stopping tracker");
                self.module.stop();
            }
        }
    }

    /// Unsubscribe from module events. Later emissions are discarded.
    pub fn detach(&mut self) {
        if let Some(mut rx) = self.events.take() {
            rx.close();
            tracing::debug!("Tracker events detached");
        }
        self.load = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTracker, StaticVideo};

    fn initialized() -> (TrackerBridge, ScriptedTracker) {
        let tracker = ScriptedTracker::new();
        let mut bridge = TrackerBridge::new(Box::new(tracker.clone()));
        bridge.load();
        tracker.finish_load(Ok(()));
        assert_eq!(bridge.poll_load(), Some(Ok(())));
        bridge.initialize(&StaticVideo::new(640, 480), 60.0);
        (bridge, tracker)
    }

    fn pose(tag: f32) -> [f32; 16] {
        let mut values = *PoseTransform::IDENTITY.values();
        values[3] = tag;
        values
    }

    #[test]
    fn load_reaches_module_once() {
        let tracker = ScriptedTracker::new();
        let mut bridge = TrackerBridge::new(Box::new(tracker.clone()));
        bridge.load();
        bridge.load();
        assert_eq!(tracker.loads(), 1);
        assert_eq!(bridge.poll_load(), None);
        assert!(!bridge.is_loaded());
    }

    #[test]
    fn load_failure_is_reported() {
        let tracker = ScriptedTracker::new();
        let mut bridge = TrackerBridge::new(Box::new(tracker.clone()));
        bridge.load();
        tracker.finish_load(Err(TrackerError::Load("wasm fetch failed".into())));
        assert_eq!(
            bridge.poll_load(),
            Some(Err(TrackerError::Load("wasm fetch failed".into())))
        );
        assert!(!bridge.is_loaded());
    }

    #[test]
    fn events_keep_emission_order() {
        let (mut bridge, tracker) = initialized();
        tracker.emit_permission_request();
        tracker.emit_pose(&pose(1.0));
        tracker.emit_ready();
        tracker.emit_pose(&pose(2.0));

        let events = bridge.poll_events();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], TrackerEvent::PermissionRequest);
        assert!(matches!(&events[1], TrackerEvent::PoseUpdate { pose, .. } if pose.values()[3] == 1.0));
        assert_eq!(events[2], TrackerEvent::Ready);
        assert!(matches!(&events[3], TrackerEvent::PoseUpdate { pose, .. } if pose.values()[3] == 2.0));
        assert!(bridge.poll_events().is_empty());
    }

    #[test]
    fn malformed_updates_are_dropped() {
        let (mut bridge, tracker) = initialized();
        tracker.emit_raw_pose(&[1.0; 9]);
        assert!(bridge.poll_events().is_empty());
    }

    #[test]
    fn locate_while_located_is_rejected() {
        let (mut bridge, tracker) = initialized();
        bridge.start_locate(320.0, 240.0, 640, 480).unwrap();
        assert_eq!(bridge.start_locate(1.0, 1.0, 640, 480), Err(LocateError::Pending));

        tracker.resolve_locate(Ok(()));
        assert_eq!(bridge.poll_locate(), Some(Ok(())));
        assert!(bridge.is_located());

        assert_eq!(
            bridge.start_locate(1.0, 1.0, 640, 480),
            Err(LocateError::AlreadyTracking)
        );
        assert_eq!(tracker.locate_requests(), vec![(320.0, 240.0, 640, 480)]);
    }

    #[test]
    fn locate_before_initialize_is_rejected() {
        let tracker = ScriptedTracker::new();
        let mut bridge = TrackerBridge::new(Box::new(tracker.clone()));
        assert_eq!(bridge.start_locate(0.0, 0.0, 10, 10), Err(LocateError::NotReady));
        assert!(tracker.locate_requests().is_empty());
    }

    #[test]
    fn failed_locate_allows_retry() {
        let (mut bridge, tracker) = initialized();
        bridge.start_locate(10.0, 10.0, 640, 480).unwrap();
        tracker.resolve_locate(Err(LocateError::NotFound));
        assert_eq!(bridge.poll_locate(), Some(Err(LocateError::NotFound)));
        assert!(!bridge.is_located());
        assert!(bridge.start_locate(20.0, 20.0, 640, 480).is_ok());
    }

    #[test]
    fn stop_silences_updates_until_next_lock() {
        let (mut bridge, tracker) = initialized();
        bridge.start_locate(1.0, 1.0, 640, 480).unwrap();
        tracker.resolve_locate(Ok(()));
        bridge.poll_locate();

        tracker.emit_pose(&pose(1.0));
        bridge.stop();
        tracker.emit_pose(&pose(2.0));
        tracker.emit_ready();
        assert_eq!(bridge.poll_events(), vec![TrackerEvent::Ready]);

        bridge.start_locate(1.0, 1.0, 640, 480).unwrap();
        tracker.resolve_locate(Ok(()));
        bridge.poll_locate();
        tracker.emit_pose(&pose(3.0));
        assert_eq!(bridge.poll_events().len(), 1);
    }

    #[test]
    fn repeated_stop_reaches_module_once() {
        let (mut bridge, tracker) = initialized();
        bridge.start_locate(1.0, 1.0, 640, 480).unwrap();
        tracker.resolve_locate(Ok(()));
        bridge.poll_locate();

        bridge.stop();
        bridge.stop();
        assert_eq!(tracker.stops(), 1);
    }

    #[test]
    fn detached_bridge_ignores_module() {
        let (mut bridge, tracker) = initialized();
        bridge.detach();
        tracker.emit_ready();
        assert!(!tracker.sink_attached());
        assert!(bridge.poll_events().is_empty());
    }
}
