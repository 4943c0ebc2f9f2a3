use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::resilience::RetryPolicy;

/// Global settings from the `controller` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Force the offline driver and skip network setup
    pub offline: bool,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    /// Default seconds a worker waits for events between ticks
    pub tick_interval: f64,
    /// Default seconds over which the task-time maximum is kept
    pub profile_window: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            offline: false,
            log_level: "warn".to_string(),
            log_file: None,
            tick_interval: 0.001,
            profile_window: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiConnect {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub interface: Option<String>,
}

/// Wireless network a drone system is reached through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiConfig {
    pub connect: WifiConnect,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Seconds between attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    #[serde(default)]
    pub backoff: Backoff,
    /// Ceiling in seconds for exponential backoff
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

impl WifiConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::try_from_secs_f64(self.retry_delay).unwrap_or_default();
        match self.backoff {
            Backoff::Fixed => RetryPolicy::fixed(delay, self.max_retries),
            Backoff::Exponential if self.max_retries > 0 => RetryPolicy::Exponential {
                base: delay,
                max: Duration::try_from_secs_f64(self.max_retry_delay).unwrap_or(delay),
                max_attempts: self.max_retries,
            },
            Backoff::Exponential => RetryPolicy::Never,
        }
    }
}

fn default_max_retries() -> usize {
    10
}

fn default_retry_delay() -> f64 {
    2.0
}

fn default_max_retry_delay() -> f64 {
    30.0
}

/// A `{source_worker: event_name}` subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub source: String,
    pub event: String,
}

impl Subscription {
    pub fn new(source: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            event: event.into(),
        }
    }
}

/// Declarative record of one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub name: String,
    pub worker_type: String,
    /// Drone system section the worker was declared in (`None` for the UI)
    pub system: Option<String>,
    pub depends_on: Vec<String>,
    pub events: Vec<Subscription>,
    /// Worker-specific parameters
    pub params: Map<String, Value>,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>, worker_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker_type: worker_type.into(),
            system: None,
            depends_on: Vec::new(),
            events: Vec::new(),
            params: Map::new(),
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn subscribe(mut self, source: impl Into<String>, event: impl Into<String>) -> Self {
        self.events.push(Subscription::new(source, event));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Deserialize the parameter bag into a worker's typed parameters.
    pub fn parameters<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|source| {
            ConfigError::InvalidParameters {
                worker: self.name.clone(),
                source,
            }
        })
    }

    /// Loop settings for this worker, falling back to the controller defaults.
    pub fn settings(&self, defaults: &ControllerConfig) -> Result<WorkerSettings, ConfigError> {
        let common: CommonParams = self.parameters()?;
        let tick_interval = common.tick_interval.unwrap_or(defaults.tick_interval);
        let profile_window = common.profile_window.unwrap_or(defaults.profile_window);

        Ok(WorkerSettings {
            tick_interval: seconds(&self.name, "tick_interval", tick_interval)?,
            profile_window: seconds(&self.name, "profile_window", profile_window)?,
            coalesce: common.coalesce,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommonParams {
    tick_interval: Option<f64>,
    profile_window: Option<f64>,
    coalesce: Vec<String>,
}

fn seconds(worker: &str, key: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::Invalid(format!("'{}' of worker '{}' must be a non-negative number of seconds, got {}", key, worker, value))
    })
}

/// How a worker loop is paced and profiled.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub tick_interval: Duration,
    pub profile_window: Duration,
    /// Event names coalesced in addition to the worker's own
    pub coalesce: Vec<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1),
            profile_window: Duration::from_secs(1),
            coalesce: Vec::new(),
        }
    }
}

/// One drone system section: its network and its workers.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub name: String,
    pub wifi: Option<WifiConfig>,
    pub workers: Vec<WorkerConfig>,
}

/// The whole configuration document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub ui: Option<WorkerConfig>,
    /// Name of a UI declared but disabled; subscriptions to it are skipped
    pub disabled_ui: Option<String>,
    pub systems: Vec<SystemConfig>,
}

impl Config {
    /// Every enabled worker, system workers first, then the UI.
    pub fn workers(&self) -> Vec<&WorkerConfig> {
        self.systems
            .iter()
            .flat_map(|system| system.workers.iter())
            .chain(self.ui.iter())
            .collect()
    }

    pub fn system(&self, name: &str) -> Option<&SystemConfig> {
        self.systems.iter().find(|system| system.name == name)
    }
}
