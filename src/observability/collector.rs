use std::collections::BTreeMap;
use std::sync::Arc;

use super::WorkerMetrics;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub worker: String,
    pub events_received: u64,
    pub events_coalesced: u64,
    pub events_handled: u64,
    pub task_ticks: u64,
    pub errors_count: u64,
    pub avg_task_us: u64,
    pub max_task_us: u64,
}

/// Per-worker metrics registry, keyed by worker name.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<String, Arc<WorkerMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metrics: Arc<WorkerMetrics>) {
        self.metrics.insert(metrics.worker().to_string(), metrics);
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(name, metrics)| {
                (
                    name.clone(),
                    MetricsSnapshot {
                        worker: metrics.worker().to_string(),
                        events_received: metrics.events_received(),
                        events_coalesced: metrics.events_coalesced(),
                        events_handled: metrics.events_handled(),
                        task_ticks: metrics.task_ticks(),
                        errors_count: metrics.errors_count(),
                        avg_task_us: metrics.avg_task_us(),
                        max_task_us: metrics.max_task_us(),
                    },
                )
            })
            .collect()
    }

    pub fn get(&self, worker: &str) -> Option<Arc<WorkerMetrics>> {
        self.metrics.get(worker).cloned()
    }
}
