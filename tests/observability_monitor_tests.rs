use std::sync::Arc;
use std::time::Duration;
use vanishcap::observability::{MetricsCollector, SystemMonitor, WorkerMetrics};

#[test]
fn test_monitor_report() {
    let mut collector = MetricsCollector::new();

    let video = Arc::new(WorkerMetrics::new("video"));
    let drone = Arc::new(WorkerMetrics::new("drone"));

    video.record_task(Duration::from_micros(200));
    video.record_task(Duration::from_micros(400));
    drone.record_received(0);
    drone.record_error();

    collector.register(video);
    collector.register(drone);

    let monitor = SystemMonitor::new(collector);
    let report = monitor.generate_report();

    assert!(report.contains("[video]"));
    assert!(report.contains("[drone]"));
    assert!(report.contains("Ticks: 2 (avg 300μs, max 400μs)"));
    assert!(report.contains("1 error"));
}

#[test]
fn test_empty_report() {
    let monitor = SystemMonitor::new(MetricsCollector::new());
    assert_eq!(monitor.generate_report(), "No workers registered");
}
