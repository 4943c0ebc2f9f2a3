use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{ControllerConfig, WorkerConfig};
use crate::core::Worker;
use crate::error::{ConfigError, InitializationError};
use crate::hal::DriverRegistry;

/// What a worker factory may use besides its own config
pub struct BuildContext<'a> {
    pub controller: &'a ControllerConfig,
    pub drivers: &'a DriverRegistry,
}

/// Factory function type for creating worker instances
pub type WorkerFactory = fn(&WorkerConfig, &BuildContext<'_>) -> Result<Box<dyn Worker>>;

/// Compile-time registration of a built-in worker type
pub struct WorkerRegistration {
    pub type_name: &'static str,
    pub description: &'static str,
    pub factory: WorkerFactory,
}

impl WorkerRegistration {
    pub const fn new(type_name: &'static str, description: &'static str, factory: WorkerFactory) -> Self {
        Self {
            type_name,
            description,
            factory,
        }
    }
}

inventory::collect!(WorkerRegistration);

type DynFactory = Arc<dyn Fn(&WorkerConfig, &BuildContext<'_>) -> Result<Box<dyn Worker>> + Send + Sync>;

/// Map from worker type identifier to its factory.
#[derive(Clone)]
pub struct WorkerTypeRegistry {
    factories: BTreeMap<String, DynFactory>,
}

impl WorkerTypeRegistry {
    /// Registry without any type
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in worker type
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for registration in inventory::iter::<WorkerRegistration> {
            registry.register(registration.type_name, registration.factory);
        }
        registry
    }

    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&WorkerConfig, &BuildContext<'_>) -> Result<Box<dyn Worker>> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Fail if `config` names a type that is not registered
    pub fn check(&self, config: &WorkerConfig) -> Result<(), ConfigError> {
        if self.contains(&config.worker_type) {
            return Ok(());
        }
        Err(ConfigError::UnknownWorkerType {
            worker: config.name.clone(),
            type_name: config.worker_type.clone(),
            available: self.list().join(", "),
        })
    }

    pub fn create(
        &self,
        config: &WorkerConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Box<dyn Worker>, InitializationError> {
        self.check(config)?;
        let factory = &self.factories[&config.worker_type];
        factory(config, ctx).map_err(|source| InitializationError::WorkerConstruction {
            worker: config.name.clone(),
            source,
        })
    }
}

impl Default for WorkerTypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Descriptions of the built-in worker types, sorted by type
pub fn builtin_descriptions() -> Vec<(&'static str, &'static str)> {
    let mut types: Vec<_> = inventory::iter::<WorkerRegistration>
        .into_iter()
        .map(|r| (r.type_name, r.description))
        .collect();
    types.sort();
    types
}
