use std::time::{Duration, Instant};

/// End-of-frame wait that caps the frame rate.
///
/// The render loop is single-threaded; this sleep is its only suspension
/// point besides event polling.
#[derive(Debug, Clone)]
pub struct FramePacer {
    frame_budget: Option<Duration>,
    frame_start: Instant,
}

impl FramePacer {
    /// `target_fps == 0` disables pacing (present mode alone limits the rate).
    pub fn new(target_fps: u32) -> Self {
        let frame_budget = (target_fps > 0).then(|| Duration::from_nanos(1_000_000_000 / u64::from(target_fps)));
        Self {
            frame_budget,
            frame_start: Instant::now(),
        }
    }

    pub fn frame_budget(&self) -> Option<Duration> {
        self.frame_budget
    }

    /// Marks the beginning of a frame.
    pub fn begin(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Time still to wait for the current frame to fill its budget.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.frame_budget {
            Some(budget) => budget.saturating_sub(now.saturating_duration_since(self.frame_start)),
            None => Duration::ZERO,
        }
    }

    /// Sleeps out the remainder of the frame budget.
    pub fn wait(&mut self) {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}
