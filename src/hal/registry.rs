use super::drivers::OfflineDriver;
use super::types::DriverConfig;
use super::DroneDriver;
use crate::error::ConfigError;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

type DriverFactory = Arc<dyn Fn(&DriverConfig) -> Result<Box<dyn DroneDriver>> + Send + Sync>;

/// Registry of available vehicle drivers, keyed by driver type.
#[derive(Clone)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in drivers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("offline", |config| Ok(Box::new(OfflineDriver::new(config.clone()))));
        registry
    }

    pub fn register<F>(&mut self, driver_type: &str, factory: F)
    where
        F: Fn(&DriverConfig) -> Result<Box<dyn DroneDriver>> + Send + Sync + 'static,
    {
        self.factories.insert(driver_type.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, driver_type: &str) -> bool {
        self.factories.contains_key(driver_type)
    }

    /// Instantiate the driver named by `config.kind`.
    pub fn create(&self, config: &DriverConfig) -> Result<Box<dyn DroneDriver>> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| ConfigError::UnknownDriver(config.kind.clone()))?;
        factory(config)
    }

    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
