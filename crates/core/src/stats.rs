//! Pose update rate.

/// Counts applied pose updates and reports a rate every `window` updates.
#[derive(Debug, Clone)]
pub struct FrameStats {
    window: u32,
    frames: u64,
    window_frames: u32,
    window_start: Option<f64>,
    fps: f32,
}

impl FrameStats {
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            frames: 0,
            window_frames: 0,
            window_start: None,
            fps: 0.0,
        }
    }

    /// Record one update at `now` (seconds). Returns the new rate when a
    /// window completes.
    pub fn record(&mut self, now: f64) -> Option<f32> {
        self.frames += 1;
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };

        self.window_frames += 1;
        if self.window_frames < self.window {
            return None;
        }

        let elapsed = now - start;
        if elapsed > 0.0 {
            self.fps = (self.window_frames as f64 / elapsed) as f32;
            tracing::debug!("Pose updates: {:.1} fps", self.fps);
        }
        self.window_frames = 0;
        self.window_start = Some(now);
        Some(self.fps)
    }

    /// Rate over the last completed window.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Updates recorded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Forget the current window, e.g. after tracking was stopped.
    pub fn reset_window(&mut self) {
        self.window_frames = 0;
        self.window_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_window() {
        let mut stats = FrameStats::new(3);
        assert_eq!(stats.record(0.0), None);
        assert_eq!(stats.record(0.5), None);
        assert_eq!(stats.record(1.0), None);
        assert_eq!(stats.record(1.5), Some(2.0));
        assert_eq!(stats.fps(), 2.0);
        assert_eq!(stats.frames(), 4);
    }

    #[test]
    fn reset_starts_new_window() {
        let mut stats = FrameStats::new(1);
        stats.record(0.0);
        stats.reset_window();
        assert_eq!(stats.record(10.0), None);
        assert_eq!(stats.record(10.25), Some(4.0));
    }
}
