use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free counters describing one worker's activity.
pub struct WorkerMetrics {
    worker: String,
    events_received: AtomicU64,
    events_coalesced: AtomicU64,
    events_handled: AtomicU64,
    task_ticks: AtomicU64,
    errors_count: AtomicU64,
    total_task_us: AtomicU64,
    max_task_us: AtomicU64,
}

impl WorkerMetrics {
    pub fn new(worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            events_received: AtomicU64::new(0),
            events_coalesced: AtomicU64::new(0),
            events_handled: AtomicU64::new(0),
            task_ticks: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            total_task_us: AtomicU64::new(0),
            max_task_us: AtomicU64::new(0),
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn events_coalesced(&self) -> u64 {
        self.events_coalesced.load(Ordering::Relaxed)
    }

    pub fn events_handled(&self) -> u64 {
        self.events_handled.load(Ordering::Relaxed)
    }

    pub fn task_ticks(&self) -> u64 {
        self.task_ticks.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn record_received(&self, superseded: usize) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        if superseded > 0 {
            self.events_coalesced.fetch_add(superseded as u64, Ordering::Relaxed);
        }
    }

    pub fn record_handled(&self) {
        self.events_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task(&self, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        self.task_ticks.fetch_add(1, Ordering::Relaxed);
        self.total_task_us.fetch_add(us, Ordering::Relaxed);
        self.max_task_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn avg_task_us(&self) -> u64 {
        let ticks = self.task_ticks.load(Ordering::Relaxed);
        if ticks == 0 {
            return 0;
        }
        self.total_task_us.load(Ordering::Relaxed) / ticks
    }

    /// Longest task tick since the worker was created
    pub fn max_task_us(&self) -> u64 {
        self.max_task_us.load(Ordering::Relaxed)
    }
}
