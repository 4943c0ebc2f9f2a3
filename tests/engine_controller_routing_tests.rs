use anyhow::{bail, Result};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use vanishcap::config::{Config, WorkerConfig};
use vanishcap::core::{names, Event, Payload, Worker, WorkerContext};
use vanishcap::engine::{Controller, ControllerBuilder, WorkerState};
use vanishcap::error::{ConfigError, InitializationError};
use vanishcap::registry::BuildContext;

/// Counts constructions and cleanups across every instance of the test worker types.
#[derive(Clone, Default)]
struct Counters {
    built: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

struct Idle {
    counters: Counters,
}

impl Worker for Idle {
    fn task(&mut self, _ctx: &WorkerContext) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _ctx: &WorkerContext) {
        self.counters.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Emits "stop" on its first tick
struct Quitter;

impl Worker for Quitter {
    fn task(&mut self, ctx: &WorkerContext) -> Result<()> {
        ctx.publish(names::STOP, Payload::None, None);
        Ok(())
    }
}

fn builder(config: serde_json::Value, counters: &Counters) -> ControllerBuilder {
    let config = Config::from_value(config).unwrap();
    let idle = counters.clone();
    Controller::builder(config)
        .register_worker("idle", move |_config: &WorkerConfig, _ctx: &BuildContext<'_>| {
            idle.built.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Idle { counters: idle.clone() }) as Box<dyn Worker>)
        })
        .register_worker("quitter", |_config: &WorkerConfig, _ctx: &BuildContext<'_>| {
            Ok(Box::new(Quitter) as Box<dyn Worker>)
        })
        .register_worker("broken", |config: &WorkerConfig, _ctx: &BuildContext<'_>| {
            bail!("cannot build {}", config.name)
        })
}

#[test]
fn test_routing_reaches_only_subscribers() {
    let counters = Counters::default();
    let controller = builder(
        json!({
            "controller": {"offline": true},
            "sys": {"workers": [
                {"idle": {"name": "a"}},
                {"idle": {"name": "b", "events": [{"a": "ping"}]}},
                {"idle": {"name": "c", "events": [{"a": "pong"}]}}
            ]}
        }),
        &counters,
    )
    .build()
    .unwrap();

    controller.route(Event::empty("a", "ping"));
    controller.route(Event::empty("b", "ping"));

    let b = controller.worker("b").unwrap().pending_events();
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].source(), "a");
    assert_eq!(b[0].name(), "ping");
    assert!(controller.worker("c").unwrap().pending_events().is_empty());
    assert!(controller.worker("a").unwrap().pending_events().is_empty());
}

#[test]
fn test_workers_built_in_dependency_order() {
    let counters = Counters::default();
    let controller = builder(
        json!({
            "controller": {"offline": true},
            "sys": {"workers": [
                {"idle": {"name": "drone", "depends_on": ["nav"]}},
                {"idle": {"name": "nav", "depends_on": ["det"]}},
                {"idle": {"name": "det"}}
            ]}
        }),
        &counters,
    )
    .build()
    .unwrap();

    assert_eq!(controller.worker_names(), vec!["det", "nav", "drone"]);
    assert_eq!(counters.built.load(Ordering::SeqCst), 3);
}

#[test]
fn test_cycle_detected_before_any_worker_is_built() {
    let counters = Counters::default();
    let err = builder(
        json!({
            "controller": {"offline": true},
            "sys": {"workers": [
                {"idle": {"name": "free"}},
                {"idle": {"name": "a", "depends_on": ["b"]}},
                {"idle": {"name": "b", "depends_on": ["a"]}}
            ]}
        }),
        &counters,
    )
    .build()
    .err()
    .unwrap();

    match err {
        InitializationError::Config(ConfigError::UnresolvedDependencies { details }) => {
            assert_eq!(details.len(), 2);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(counters.built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_missing_dependency_detected() {
    let counters = Counters::default();
    let err = builder(
        json!({"sys": {"workers": [{"idle": {"name": "a", "depends_on": ["ghost"]}}]}}),
        &counters,
    )
    .build()
    .err()
    .unwrap();

    assert!(err.to_string().contains("missing or circular"));
    assert_eq!(counters.built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unknown_type_rejected_before_construction() {
    let counters = Counters::default();
    let err = builder(
        json!({"sys": {"workers": [{"idle": {"name": "a"}}, {"teleporter": {"name": "b"}}]}}),
        &counters,
    )
    .build()
    .err()
    .unwrap();

    assert!(matches!(
        err,
        InitializationError::Config(ConfigError::UnknownWorkerType { .. })
    ));
    assert_eq!(counters.built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failed_construction_cleans_up_built_workers() {
    let counters = Counters::default();
    let err = builder(
        json!({"controller": {"offline": true}, "sys": {"workers": [
            {"idle": {"name": "a"}},
            {"broken": {"name": "b", "depends_on": ["a"]}}
        ]}}),
        &counters,
    )
    .build()
    .err()
    .unwrap();

    match err {
        InitializationError::WorkerConstruction { worker, .. } => assert_eq!(worker, "b"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(counters.built.load(Ordering::SeqCst), 1);
    assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_event_source_rejected() {
    let counters = Counters::default();
    let err = builder(
        json!({"sys": {"workers": [{"idle": {"name": "a", "events": [{"nobody": "ping"}]}}]}}),
        &counters,
    )
    .build()
    .err()
    .unwrap();

    assert!(matches!(
        err,
        InitializationError::Config(ConfigError::UnknownEventSource { .. })
    ));
}

#[test]
fn test_stop_event_shuts_down_system() {
    let counters = Counters::default();
    let controller = builder(
        json!({"controller": {"offline": true}, "sys": {"workers": [
            {"idle": {"name": "a"}},
            {"quitter": {"name": "q"}}
        ]}}),
        &counters,
    )
    .build()
    .unwrap();

    let started = Instant::now();
    controller.run().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(controller.is_stopping());
    assert_eq!(controller.worker("a").unwrap().state(), WorkerState::Stopped);
    assert_eq!(controller.worker("q").unwrap().state(), WorkerState::Stopped);
    assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_handle_unblocks_run() {
    let counters = Counters::default();
    let controller = builder(
        json!({"controller": {"offline": true}, "sys": {"workers": [{"idle": {"name": "a"}}]}}),
        &counters,
    )
    .build()
    .unwrap();

    let stop = controller.stop_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        stop.stop();
    });

    controller.run().unwrap();
    stopper.join().unwrap();

    assert_eq!(controller.worker("a").unwrap().state(), WorkerState::Stopped);
    controller.shutdown();
    assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_before_run_starts_nothing() {
    let counters = Counters::default();
    let controller = builder(
        json!({"controller": {"offline": true}, "sys": {"workers": [{"idle": {"name": "a"}}]}}),
        &counters,
    )
    .build()
    .unwrap();

    // A signal arriving between construction and run
    controller.stop_handle().stop();
    assert!(controller.is_stopping());

    let started = Instant::now();
    controller.run().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(controller.is_stopping());
    assert_eq!(controller.worker("a").unwrap().state(), WorkerState::Stopped);
    assert_eq!(controller.worker("a").unwrap().metrics().task_ticks(), 0);
    assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_disabled_ui_routes_are_skipped() {
    let counters = Counters::default();
    let controller = builder(
        json!({
            "controller": {"offline": true},
            "ui": {"name": "ui", "disabled": true},
            "sys": {"workers": [{"idle": {"name": "a", "events": [{"ui": "command"}]}}]}
        }),
        &counters,
    )
    .build()
    .unwrap();

    assert!(controller.routes().is_empty());
    assert!(controller.main_worker().is_none());
}

#[test]
fn test_metrics_report_lists_workers() {
    let counters = Counters::default();
    let controller = builder(
        json!({"controller": {"offline": true}, "sys": {"workers": [{"idle": {"name": "a"}}]}}),
        &counters,
    )
    .build()
    .unwrap();

    let report = controller.metrics_report();
    assert!(report.contains("=== Worker Metrics ==="));
    assert!(report.contains("[a]"));
}
