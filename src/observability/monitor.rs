use super::MetricsCollector;

/// Renders a human-readable activity report of every registered worker.
pub struct SystemMonitor {
    collector: MetricsCollector,
}

impl SystemMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();

        if snapshot.is_empty() {
            return "No workers registered".to_string();
        }

        let mut report = String::from("=== Worker Metrics ===\n");

        for (name, metrics) in snapshot.iter() {
            report.push_str(&format!(
                "\n[{}]\n  Events: {} received, {} coalesced, {} handled\n  Ticks: {} (avg {}μs, max {}μs)\n  Errors: {}\n",
                name,
                metrics.events_received,
                metrics.events_coalesced,
                metrics.events_handled,
                metrics.task_ticks,
                metrics.avg_task_us,
                metrics.max_task_us,
                if metrics.errors_count > 0 {
                    format!("{} error{}", metrics.errors_count, if metrics.errors_count == 1 { "" } else { "s" })
                } else {
                    "0 errors".to_string()
                },
            ));
        }

        report
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}
