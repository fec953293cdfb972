//! Cooperative frame loop.
//!
//! The host owns the actual timer (`requestAnimationFrame`, a winit redraw
//! request, a test clock). [`FrameLoop`] only tracks whether a tick is
//! pending so that the loop can never run twice in parallel.

/// Handle for a scheduled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(pub u64);

/// Host timer that calls back into the session once per frame.
pub trait FrameScheduler {
    /// Ask for one callback on the next frame.
    fn request_frame(&mut self) -> FrameRequest;

    /// Cancel a request that has not fired yet.
    fn cancel_frame(&mut self, request: FrameRequest);

    /// Monotonic clock in seconds.
    fn now_seconds(&self) -> f64;
}

/// Single pending continuation plus a tick counter.
#[derive(Debug, Default)]
pub struct FrameLoop {
    pending: Option<FrameRequest>,
    ticks: u64,
    running: bool,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the loop and schedule the first tick.
    pub fn start(&mut self, scheduler: &mut dyn FrameScheduler) {
        if self.running {
            tracing::debug!("Frame loop already running");
            return;
        }
        self.running = true;
        self.schedule(scheduler);
    }

    /// Schedule the next tick. No-op while one is pending or after cancel.
    pub fn schedule(&mut self, scheduler: &mut dyn FrameScheduler) {
        if !self.running || self.pending.is_some() {
            return;
        }
        self.pending = Some(scheduler.request_frame());
    }

    /// Consume the pending request for the tick that is about to run.
    ///
    /// Returns false for spurious callbacks (nothing pending, or the loop
    /// was cancelled), which must not run a tick.
    pub fn begin_tick(&mut self) -> bool {
        if !self.running || self.pending.take().is_none() {
            return false;
        }
        self.ticks += 1;
        true
    }

    /// Stop the loop and cancel any pending tick.
    pub fn cancel(&mut self, scheduler: &mut dyn FrameScheduler) {
        self.running = false;
        if let Some(request) = self.pending.take() {
            scheduler.cancel_frame(request);
        }
    }

    /// Ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualScheduler;

    #[test]
    fn start_twice_schedules_once() {
        let mut scheduler = ManualScheduler::new();
        let mut frame_loop = FrameLoop::new();
        frame_loop.start(&mut scheduler);
        frame_loop.start(&mut scheduler);
        frame_loop.schedule(&mut scheduler);
        assert_eq!(scheduler.requests(), 1);
        assert!(frame_loop.is_pending());
    }

    #[test]
    fn ticks_count_scheduled_frames() {
        let mut scheduler = ManualScheduler::new();
        let mut frame_loop = FrameLoop::new();
        frame_loop.start(&mut scheduler);

        for _ in 0..3 {
            assert!(frame_loop.begin_tick());
            frame_loop.schedule(&mut scheduler);
        }
        assert_eq!(frame_loop.ticks(), 3);
        assert_eq!(scheduler.requests(), 4);
    }

    #[test]
    fn spurious_callback_does_not_tick() {
        let mut scheduler = ManualScheduler::new();
        let mut frame_loop = FrameLoop::new();
        frame_loop.start(&mut scheduler);
        assert!(frame_loop.begin_tick());
        assert!(!frame_loop.begin_tick());
        assert_eq!(frame_loop.ticks(), 1);
    }

    #[test]
    fn cancel_stops_rescheduling() {
        let mut scheduler = ManualScheduler::new();
        let mut frame_loop = FrameLoop::new();
        frame_loop.start(&mut scheduler);
        frame_loop.cancel(&mut scheduler);

        assert_eq!(scheduler.cancels(), 1);
        assert!(!frame_loop.begin_tick());
        frame_loop.schedule(&mut scheduler);
        assert_eq!(scheduler.requests(), 1);
        assert!(!frame_loop.is_running());
    }
}
