pub mod collector;
pub mod metrics;
pub mod monitor;
pub mod profiler;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use metrics::WorkerMetrics;
pub use monitor::SystemMonitor;
pub use profiler::TaskProfiler;
