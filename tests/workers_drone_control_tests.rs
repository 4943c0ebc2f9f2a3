use std::time::{Duration, Instant};
use vanishcap::core::{names, Event, Payload, Target, Worker, WorkerContext};
use vanishcap::error::ActuationError;
use vanishcap::hal::mock::{CallLog, DriverCall, RecordingDriver};
use vanishcap::hal::{CommandState, DriverLimits};
use vanishcap::workers::{Drone, DroneParams};

fn drone_with(params: DroneParams) -> (Drone, CallLog, WorkerContext) {
    let driver = RecordingDriver::default();
    let log = driver.log();
    let drone = Drone::new(params, Box::new(driver)).unwrap();
    (drone, log, WorkerContext::detached("drone"))
}

fn drone() -> (Drone, CallLog, WorkerContext) {
    drone_with(DroneParams::default())
}

fn target(x: f64, bbox: [f64; 4]) -> Event {
    let target = Target {
        x,
        y: (bbox[1] + bbox[3]) / 2.0,
        confidence: 1.0,
        bbox,
    };
    Event::new("navigator", names::TARGET, Payload::Target(target)).with_frame_number(1)
}

/// Centered target that only needs forward motion
fn centered() -> Event {
    target(0.0, [-0.05, -0.2, 0.05, 0.8])
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[test]
fn test_connects_on_creation() {
    let (_drone, log, _ctx) = drone();
    assert_eq!(log.calls(), vec![DriverCall::Connect]);
}

#[test]
fn test_identical_commands_transmitted_once() {
    let (mut drone, log, ctx) = drone();
    let t0 = Instant::now();

    drone.step(t0, &ctx);
    drone.step(t0 + secs(0.01), &ctx);
    drone.step(t0 + secs(0.02), &ctx);

    assert_eq!(log.rc_commands(), vec![CommandState::ZERO]);
}

#[test]
fn test_target_triggers_takeoff_then_follow() {
    let (mut drone, log, ctx) = drone();
    let t0 = Instant::now();

    drone.handle_event(centered(), &ctx).unwrap();
    drone.step(t0, &ctx);

    assert!(drone.is_flying());
    assert!(drone.ready_to_process_targets());
    assert_eq!(log.count("takeoff"), 1);

    let sent = log.rc_commands();
    let last = sent.last().copied().unwrap();
    assert!(last.fb > 0);
    assert_eq!(last.yaw, 0);
    assert!(drone.current_target().unwrap().processed);
}

#[test]
fn test_processed_target_is_not_followed_again() {
    let (mut drone, log, ctx) = drone();
    let t0 = Instant::now();

    drone.handle_event(centered(), &ctx).unwrap();
    drone.step(t0, &ctx);
    let sent = log.count("rc");

    drone.step(t0 + secs(0.1), &ctx);
    drone.step(t0 + secs(0.2), &ctx);
    assert_eq!(log.count("rc"), sent);
}

#[test]
fn test_deadband_zeroes_small_offsets() {
    let (mut drone, _log, ctx) = drone();

    // x, width error and anchor offset all below 0.1
    drone.handle_event(target(0.099, [-0.25, -0.05, 0.3, 0.2]), &ctx).unwrap();
    drone.step(Instant::now(), &ctx);

    assert_eq!(drone.command(), CommandState::ZERO);
    assert!(!drone.executing_yaw());
}

#[test]
fn test_yaw_burst_duration_and_stop() {
    let (mut drone, log, ctx) = drone();
    let t0 = Instant::now();

    // Full offset: 41.3 degrees at 50 deg/s is 0.826 s
    drone.handle_event(target(1.0, [0.85, -0.2, 1.0, 0.8]), &ctx).unwrap();
    drone.step(t0, &ctx);
    assert!(drone.executing_yaw());
    assert_eq!(log.rc_commands().last().map(|c| c.yaw), Some(100));

    drone.step(t0 + secs(0.8), &ctx);
    assert!(drone.executing_yaw());
    assert_eq!(log.rc_commands().last().map(|c| c.yaw), Some(100));

    drone.step(t0 + secs(0.83), &ctx);
    assert!(!drone.executing_yaw());
    let last = log.rc_commands().last().copied().unwrap();
    assert_eq!(last.yaw, 0);
    assert!(last.fb > 0);
}

#[test]
fn test_negative_offset_yaws_left() {
    let (mut drone, log, ctx) = drone();

    drone.handle_event(target(-0.5, [-1.0, -0.2, 0.0, 0.8]), &ctx).unwrap();
    drone.step(Instant::now(), &ctx);

    assert_eq!(log.rc_commands().last().map(|c| c.yaw), Some(-100));
}

#[test]
fn test_slow_yaw_rate_holds_burst_without_overflow() {
    let limits = DriverLimits {
        max_angular_velocity: 1e-18,
        ..Default::default()
    };
    let driver = RecordingDriver::new(limits);
    let log = driver.log();
    let params = DroneParams {
        target_timeout: 7200.0,
        ..Default::default()
    };
    let mut drone = Drone::new(params, Box::new(driver)).unwrap();
    let ctx = WorkerContext::detached("drone");
    let t0 = Instant::now();

    drone.handle_event(target(1.0, [0.85, -0.2, 1.0, 0.8]), &ctx).unwrap();
    drone.step(t0, &ctx);
    drone.step(t0 + secs(3600.0), &ctx);

    assert!(drone.executing_yaw());
    assert_eq!(log.rc_commands().last().map(|c| c.yaw), Some(100));
}

#[test]
fn test_unusable_limits_rejected() {
    let broken = [
        DriverLimits {
            max_angular_velocity: 0.0,
            ..Default::default()
        },
        DriverLimits {
            max_linear_velocity: -10.0,
            ..Default::default()
        },
        DriverLimits {
            field_of_view: f64::NAN,
            ..Default::default()
        },
        DriverLimits {
            max_vertical_velocity: f64::INFINITY,
            ..Default::default()
        },
    ];
    for limits in broken {
        let driver = RecordingDriver::new(limits.clone());
        let log = driver.log();
        assert!(Drone::new(DroneParams::default(), Box::new(driver)).is_err(), "{:?}", limits);
        assert!(log.calls().is_empty());
    }
}

#[test]
fn test_unrepresentable_durations_rejected() {
    for params in [
        DroneParams {
            target_timeout: 1e300,
            ..Default::default()
        },
        DroneParams {
            search_duration: f64::INFINITY,
            ..Default::default()
        },
        DroneParams {
            min_yaw_delay: -1.0,
            ..Default::default()
        },
        DroneParams {
            telemetry_interval: f64::NAN,
            ..Default::default()
        },
    ] {
        assert!(Drone::new(params, Box::new(RecordingDriver::default())).is_err());
    }
}

#[test]
fn test_timeout_past_clock_range_keeps_target() {
    // Fits in a Duration but not as an offset from now
    let (mut drone, log, ctx) = drone_with(DroneParams {
        target_timeout: 1e19,
        telemetry_interval: 1e19,
        ..Default::default()
    });
    let t0 = Instant::now();

    drone.handle_event(centered(), &ctx).unwrap();
    drone.step(t0, &ctx);
    drone.step(t0 + secs(3600.0), &ctx);

    assert!(drone.current_target().is_some());
    assert!(log.rc_commands().last().unwrap().fb > 0);
}

#[test]
fn test_search_past_clock_range_keeps_sweeping() {
    let (mut drone, log, ctx) = drone_with(DroneParams {
        search_duration: 1e19,
        ..Default::default()
    });
    let t0 = Instant::now();

    drone.handle_event(target(0.5, [0.0, -0.2, 1.0, 0.8]), &ctx).unwrap();
    drone.step(t0, &ctx);
    drone.step(t0 + secs(1.1), &ctx);
    drone.step(t0 + secs(3600.0), &ctx);

    assert!(drone.searching());
    assert_eq!(log.rc_commands().last().copied(), Some(CommandState::new(0, 0, 0, 50)));
}

#[test]
fn test_min_yaw_delay_between_bursts() {
    let (mut drone, _log, ctx) = drone_with(DroneParams {
        min_yaw_delay: 1.0,
        target_timeout: 5.0,
        ..Default::default()
    });
    let t0 = Instant::now();

    drone.handle_event(target(0.2, [0.1, -0.2, 0.3, 0.8]), &ctx).unwrap();
    drone.step(t0, &ctx);
    assert!(drone.executing_yaw());

    drone.handle_event(target(0.2, [0.1, -0.2, 0.3, 0.8]), &ctx).unwrap();
    drone.step(t0 + secs(0.5), &ctx);
    assert!(!drone.executing_yaw());

    drone.handle_event(target(0.2, [0.1, -0.2, 0.3, 0.8]), &ctx).unwrap();
    drone.step(t0 + secs(1.1), &ctx);
    assert!(drone.executing_yaw());
}

#[test]
fn test_target_timeout_stops_motion() {
    let (mut drone, log, ctx) = drone();
    let t0 = Instant::now();

    drone.handle_event(centered(), &ctx).unwrap();
    drone.step(t0, &ctx);
    assert!(log.rc_commands().last().unwrap().fb > 0);

    drone.step(t0 + secs(0.9), &ctx);
    assert!(drone.current_target().is_some());

    drone.step(t0 + secs(1.1), &ctx);
    assert!(drone.current_target().is_none());
    assert_eq!(log.rc_commands().last().copied(), Some(CommandState::ZERO));
}

#[test]
fn test_empty_target_does_not_refresh_timeout() {
    let (mut drone, _log, ctx) = drone();
    let t0 = Instant::now();

    drone.handle_event(centered(), &ctx).unwrap();
    drone.step(t0, &ctx);

    drone.handle_event(Event::empty("navigator", names::TARGET), &ctx).unwrap();
    drone.step(t0 + secs(0.9), &ctx);
    drone.step(t0 + secs(1.1), &ctx);

    assert!(drone.current_target().is_none());
}

#[test]
fn test_search_sweeps_toward_last_side() {
    let (mut drone, log, ctx) = drone_with(DroneParams {
        search_duration: 2.0,
        ..Default::default()
    });
    let t0 = Instant::now();

    drone.handle_event(target(0.5, [0.0, -0.2, 1.0, 0.8]), &ctx).unwrap();
    drone.step(t0, &ctx);

    drone.step(t0 + secs(1.1), &ctx);
    assert!(drone.searching());
    assert_eq!(log.rc_commands().last().copied(), Some(CommandState::new(0, 0, 0, 50)));

    drone.step(t0 + secs(3.2), &ctx);
    assert!(!drone.searching());
    assert_eq!(log.rc_commands().last().copied(), Some(CommandState::ZERO));
}

#[test]
fn test_centered_target_leaves_no_search() {
    let (mut drone, _log, ctx) = drone();
    let t0 = Instant::now();

    drone.handle_event(centered(), &ctx).unwrap();
    drone.step(t0, &ctx);
    drone.step(t0 + secs(1.1), &ctx);

    assert!(!drone.searching());
    assert_eq!(drone.command(), CommandState::ZERO);
}

#[test]
fn test_auto_takeoff_without_target() {
    let (mut drone, log, ctx) = drone_with(DroneParams {
        auto_takeoff: true,
        ..Default::default()
    });

    drone.step(Instant::now(), &ctx);

    assert!(drone.is_flying());
    assert_eq!(
        log.calls(),
        vec![DriverCall::Connect, DriverCall::Takeoff, DriverCall::Rc(CommandState::ZERO)]
    );
}

#[test]
fn test_failed_takeoff_is_retried_and_blocks_follow() {
    let (mut drone, log, ctx) = drone();
    log.fail("takeoff", ActuationError::Connection("link down".to_string()));
    let t0 = Instant::now();

    drone.handle_event(centered(), &ctx).unwrap();
    drone.step(t0, &ctx);
    assert!(!drone.is_flying());
    assert!(!drone.ready_to_process_targets());
    assert!(!drone.current_target().unwrap().processed);

    log.heal("takeoff");
    drone.handle_event(centered(), &ctx).unwrap();
    drone.step(t0 + secs(0.1), &ctx);

    assert_eq!(log.count("takeoff"), 2);
    assert!(drone.is_flying());
    assert!(drone.current_target().unwrap().processed);
}

#[test]
fn test_failed_rc_is_retried_next_tick() {
    let (mut drone, log, ctx) = drone();
    log.fail("rc", ActuationError::Timeout("no ack".to_string()));
    let t0 = Instant::now();

    drone.step(t0, &ctx);
    drone.step(t0 + secs(0.01), &ctx);
    assert_eq!(log.count("rc"), 2);
    assert_eq!(drone.last_sent(), None);

    log.heal("rc");
    drone.step(t0 + secs(0.02), &ctx);
    drone.step(t0 + secs(0.03), &ctx);
    assert_eq!(log.count("rc"), 3);
    assert_eq!(drone.last_sent(), Some(CommandState::ZERO));
}

#[test]
fn test_finish_lands_and_disconnects() {
    let (mut drone, log, ctx) = drone();

    drone.handle_event(centered(), &ctx).unwrap();
    drone.step(Instant::now(), &ctx);
    log.clear();

    drone.finish(&ctx);

    assert_eq!(
        log.calls(),
        vec![DriverCall::Rc(CommandState::ZERO), DriverCall::Land, DriverCall::Disconnect]
    );
    assert!(!drone.is_flying());
    assert!(!drone.ready_to_process_targets());
}

#[test]
fn test_finish_on_ground_only_disconnects() {
    let (mut drone, log, ctx) = drone();
    log.fail("disconnect", ActuationError::Runtime("already closed".to_string()));

    drone.finish(&ctx);

    assert_eq!(log.calls(), vec![DriverCall::Connect, DriverCall::Disconnect]);
}

#[test]
fn test_disabled_yaw_never_reaches_vehicle() {
    let driver = RecordingDriver::new(DriverLimits {
        disable_yaw: true,
        ..Default::default()
    });
    let log = driver.log();
    let mut drone = Drone::new(DroneParams::default(), Box::new(driver)).unwrap();
    let ctx = WorkerContext::detached("drone");

    drone.handle_event(target(1.0, [0.5, -0.2, 1.0, 0.8]), &ctx).unwrap();
    drone.step(Instant::now(), &ctx);

    assert_eq!(drone.command().yaw, 100);
    assert!(log.rc_commands().iter().all(|c| c.yaw == 0));
}

#[test]
fn test_telemetry_published_on_interval() {
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use vanishcap::core::EventSink;

    struct Sink(Mutex<Vec<Event>>);
    impl EventSink for Sink {
        fn route(&self, event: Event) {
            self.0.lock().push(event);
        }
    }

    let sink = Arc::new(Sink(Mutex::new(Vec::new())));
    let dyn_sink: Arc<dyn EventSink> = sink.clone();
    let ctx = WorkerContext::new("drone", Arc::downgrade(&dyn_sink), Arc::new(AtomicBool::new(false)));

    let (mut drone, _log, _detached) = drone_with(DroneParams {
        telemetry_interval: 1.0,
        ..Default::default()
    });
    let t0 = Instant::now();
    drone.step(t0, &ctx);
    drone.step(t0 + secs(0.5), &ctx);
    drone.step(t0 + secs(1.0), &ctx);

    let events = sink.0.lock();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.is(names::TELEMETRY)));
    assert_eq!(events[0].data().as_json().unwrap()["bat"], serde_json::json!(87));
}
