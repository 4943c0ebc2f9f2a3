use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::types::{Config, ControllerConfig, Subscription, SystemConfig, WifiConfig, WorkerConfig};
use crate::error::ConfigError;

const CONTROLLER_SECTION: &str = "controller";
const UI_SECTION: &str = "ui";
/// Worker type used for the UI section when none is given
pub const DEFAULT_UI_TYPE: &str = "monitor";

impl Config {
    /// Load a configuration document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(text).map_err(ConfigError::Malformed)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(root) = value else {
            return Err(ConfigError::Invalid("top level must be an object".to_string()));
        };

        let mut config = Config::default();

        for (section, body) in root {
            match section.as_str() {
                CONTROLLER_SECTION => {
                    config.controller = serde_json::from_value::<ControllerConfig>(body)
                        .map_err(|e| ConfigError::Invalid(format!("controller section: {}", e)))?;
                }
                UI_SECTION => parse_ui(&mut config, body)?,
                _ => {
                    if let Some(system) = parse_system(&section, body)? {
                        info!(system = %system.name, workers = system.workers.len(), "Loaded drone system");
                        config.systems.push(system);
                    }
                }
            }
        }

        Ok(config)
    }
}

fn parse_ui(config: &mut Config, body: Value) -> Result<(), ConfigError> {
    let Value::Object(mut map) = body else {
        return Err(ConfigError::Invalid(format!("'{}' section must be an object", UI_SECTION)));
    };

    let disabled = map.remove("disabled").and_then(|v| v.as_bool()).unwrap_or(false);
    if disabled {
        config.disabled_ui = map.get("name").and_then(Value::as_str).map(str::to_string);
        warn!("UI worker is disabled");
        return Ok(());
    }

    config.ui = Some(parse_worker(UI_SECTION, Some(DEFAULT_UI_TYPE), map)?);
    Ok(())
}

fn parse_system(section: &str, body: Value) -> Result<Option<SystemConfig>, ConfigError> {
    let Value::Object(mut map) = body else {
        warn!(section, "Skipping non-object top-level section");
        return Ok(None);
    };

    let wifi = match map.remove("wifi") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<WifiConfig>(value)
                .map_err(|e| ConfigError::Invalid(format!("wifi config of '{}': {}", section, e)))?,
        ),
    };

    let entries = match map.remove("workers") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(ConfigError::Invalid(format!("'workers' key in {} must be a list", section)));
        }
    };

    let interface = wifi.as_ref().and_then(|w| w.connect.interface.clone());
    let mut workers = Vec::with_capacity(entries.len());

    for entry in entries {
        let (worker_type, body) = single_entry(entry).ok_or_else(|| {
            ConfigError::Invalid(format!("Invalid worker entry in {}: expected an object with one key", section))
        })?;
        let Value::Object(body) = body else {
            return Err(ConfigError::Invalid(format!(
                "Invalid worker config value for type '{}' in {}",
                worker_type, section
            )));
        };

        let mut worker = parse_worker(section, Some(&worker_type), body)?;
        worker.system = Some(section.to_string());
        if worker.worker_type == "drone" {
            if let Some(interface) = &interface {
                inject_interface(&mut worker, interface);
            }
        }
        workers.push(worker);
    }

    Ok(Some(SystemConfig {
        name: section.to_string(),
        wifi,
        workers,
    }))
}

fn parse_worker(
    section: &str,
    inferred_type: Option<&str>,
    mut params: Map<String, Value>,
) -> Result<WorkerConfig, ConfigError> {
    let name = match params.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => {
            return Err(ConfigError::MissingName {
                section: section.to_string(),
            })
        }
    };

    let worker_type = match params.remove("type") {
        Some(Value::String(t)) => t,
        Some(_) => return Err(ConfigError::Invalid(format!("'type' of worker '{}' must be a string", name))),
        None => inferred_type.map(str::to_string).unwrap_or_else(|| name.to_lowercase()),
    };

    let depends_on = match params.remove("depends_on") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(dep)) => vec![dep],
        Some(Value::Array(deps)) => deps
            .into_iter()
            .map(|dep| match dep {
                Value::String(dep) => Ok(dep),
                other => Err(ConfigError::Invalid(format!(
                    "Invalid dependency {} for worker '{}'",
                    other, name
                ))),
            })
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "'depends_on' of worker '{}' must be a list, got {}",
                name, other
            )))
        }
    };

    let events = match params.remove("events") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(specs)) => specs
            .into_iter()
            .map(|spec| parse_subscription(&name, spec))
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "Invalid events list for worker '{}': {}. Must be a list",
                name, other
            )))
        }
    };

    Ok(WorkerConfig {
        name,
        worker_type,
        system: None,
        depends_on,
        events,
        params,
    })
}

fn parse_subscription(worker: &str, spec: Value) -> Result<Subscription, ConfigError> {
    let rendered = spec.to_string();
    match single_entry(spec) {
        Some((source, Value::String(event))) => Ok(Subscription::new(source, event)),
        _ => Err(ConfigError::Invalid(format!(
            "Event spec for {} must have exactly one source:event pair: {}",
            worker, rendered
        ))),
    }
}

fn single_entry(value: Value) -> Option<(String, Value)> {
    match value {
        Value::Object(map) if map.len() == 1 => map.into_iter().next(),
        _ => None,
    }
}

fn inject_interface(worker: &mut WorkerConfig, interface: &str) {
    let driver = worker
        .params
        .entry("driver")
        .or_insert_with(|| Value::Object(Map::new()));
    if !driver.is_object() {
        *driver = Value::Object(Map::new());
    }
    if let Value::Object(driver) = driver {
        driver.insert("interface".to_string(), Value::String(interface.to_string()));
        info!(worker = %worker.name, interface, "Injected WiFi interface into drone config");
    }
}
