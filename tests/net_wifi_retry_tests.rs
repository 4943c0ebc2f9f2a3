use anyhow::Result;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vanishcap::config::{Config, WifiConfig, WifiConnect, WorkerConfig};
use vanishcap::core::{Worker, WorkerContext};
use vanishcap::engine::Controller;
use vanishcap::error::{InitializationError, NetworkError};
use vanishcap::net::{connect_with_retry, NetworkManager, WifiConnection, WifiSession};
use vanishcap::registry::BuildContext;
use vanishcap::resilience::RetryPolicy;

/// Scriptable network backend shared between a test and the code under test.
#[derive(Clone, Default)]
struct FakeNetwork {
    current: Arc<Mutex<Option<String>>>,
    failures_left: Arc<AtomicUsize>,
    connects: Arc<Mutex<Vec<String>>>,
    scans: Arc<AtomicUsize>,
}

impl FakeNetwork {
    fn on(ssid: &str) -> Self {
        let network = Self::default();
        *network.current.lock() = Some(ssid.to_string());
        network
    }

    fn failing(self, times: usize) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }
}

impl NetworkManager for FakeNetwork {
    fn current(&mut self) -> Result<Option<WifiConnection>, NetworkError> {
        Ok(self.current.lock().clone().map(|ssid| WifiConnection {
            ssid,
            device: "wlan0".to_string(),
        }))
    }

    fn scan(&mut self) -> Result<(), NetworkError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), NetworkError> {
        self.connects.lock().push(ssid.to_string());
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(NetworkError::Command {
                command: format!("nmcli device wifi connect {}", ssid),
                stderr: "No network with SSID found".to_string(),
            });
        }
        *self.current.lock() = Some(ssid.to_string());
        Ok(())
    }
}

fn no_wait(attempts: usize) -> RetryPolicy {
    RetryPolicy::fixed(std::time::Duration::ZERO, attempts)
}

fn wifi(ssid: &str, max_retries: usize) -> WifiConfig {
    WifiConfig {
        connect: WifiConnect {
            ssid: ssid.to_string(),
            password: String::new(),
            interface: None,
        },
        max_retries,
        retry_delay: 0.0,
        backoff: Default::default(),
        max_retry_delay: 0.0,
    }
}

#[test]
fn test_already_connected_skips_connect() {
    let mut network = FakeNetwork::on("TELLO-1");

    connect_with_retry(&mut network, "TELLO-1", "", &no_wait(3)).unwrap();

    assert!(network.connects.lock().is_empty());
}

#[test]
fn test_succeeds_after_failures() {
    let mut network = FakeNetwork::on("home").failing(2);

    connect_with_retry(&mut network, "TELLO-1", "", &no_wait(3)).unwrap();

    assert_eq!(network.connects.lock().len(), 3);
    assert_eq!(network.scans.load(Ordering::SeqCst), 2);
    assert_eq!(network.current.lock().as_deref(), Some("TELLO-1"));
}

#[test]
fn test_exhausted_retries() {
    let mut network = FakeNetwork::default().failing(10);

    let err = connect_with_retry(&mut network, "TELLO-1", "", &no_wait(2)).unwrap_err();

    assert!(matches!(err, NetworkError::Exhausted { attempts: 2, .. }));
    assert_eq!(network.connects.lock().len(), 3);
}

#[test]
fn test_session_restores_previous_network() {
    let network = FakeNetwork::on("home");

    let mut session = WifiSession::establish("tello", Box::new(network.clone()), &wifi("TELLO-1", 1)).unwrap();
    assert_eq!(session.previous().map(|p| p.ssid.as_str()), Some("home"));
    assert_eq!(network.current.lock().as_deref(), Some("TELLO-1"));

    session.restore().unwrap();
    assert_eq!(network.current.lock().as_deref(), Some("home"));
}

struct Idle;

impl Worker for Idle {
    fn task(&mut self, _ctx: &WorkerContext) -> Result<()> {
        Ok(())
    }
}

fn system_config() -> Config {
    Config::from_value(json!({
        "controller": {"offline": false},
        "tello": {
            "wifi": {"connect": {"ssid": "TELLO-1"}, "max_retries": 1, "retry_delay": 0},
            "workers": [{"idle": {"name": "a"}}]
        }
    }))
    .unwrap()
}

#[test]
fn test_network_failure_aborts_before_workers() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let network = FakeNetwork::on("home").failing(10);

    let err = Controller::builder(system_config())
        .register_worker("idle", move |_config: &WorkerConfig, _ctx: &BuildContext<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Idle) as Box<dyn Worker>)
        })
        .network_manager(move |_system, _wifi| Box::new(network.clone()))
        .build()
        .err()
        .unwrap();

    match err {
        InitializationError::Network { system, source } => {
            assert_eq!(system, "tello");
            assert!(matches!(source, NetworkError::Exhausted { .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_shutdown_restores_network() {
    let network = FakeNetwork::on("home");
    let shared = network.clone();

    let controller = Controller::builder(system_config())
        .register_worker("idle", |_config: &WorkerConfig, _ctx: &BuildContext<'_>| {
            Ok(Box::new(Idle) as Box<dyn Worker>)
        })
        .network_manager(move |_system, _wifi| Box::new(shared.clone()))
        .build()
        .unwrap();
    assert_eq!(network.current.lock().as_deref(), Some("TELLO-1"));

    controller.shutdown();
    assert_eq!(network.current.lock().as_deref(), Some("home"));
}

#[test]
fn test_offline_mode_skips_network() {
    let network = FakeNetwork::on("home").failing(10);
    let shared = network.clone();
    let mut config = system_config();
    config.controller.offline = true;

    Controller::builder(config)
        .register_worker("idle", |_config: &WorkerConfig, _ctx: &BuildContext<'_>| {
            Ok(Box::new(Idle) as Box<dyn Worker>)
        })
        .network_manager(move |_system, _wifi| Box::new(shared.clone()))
        .build()
        .unwrap();

    assert!(network.connects.lock().is_empty());
}
