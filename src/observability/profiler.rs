use std::time::{Duration, Instant};

use crate::core::WorkerProfile;

/// Rolling task timer: the last tick duration plus the maximum seen in the
/// current window. The maximum restarts from zero once the window has passed.
#[derive(Debug, Clone)]
pub struct TaskProfiler {
    window: Duration,
    window_start: Instant,
    last: Duration,
    max: Duration,
}

impl TaskProfiler {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, now: Instant) -> Self {
        Self {
            window,
            window_start: now,
            last: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.record_at(elapsed, Instant::now());
    }

    pub fn record_at(&mut self, elapsed: Duration, now: Instant) {
        if now.saturating_duration_since(self.window_start) > self.window {
            self.max = Duration::ZERO;
            self.window_start = now;
        }
        self.last = elapsed;
        self.max = self.max.max(elapsed);
    }

    pub fn last(&self) -> Duration {
        self.last
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn profile(&self) -> WorkerProfile {
        WorkerProfile {
            task_time: self.max.as_secs_f64(),
            last_task_time: self.last.as_secs_f64(),
        }
    }
}
