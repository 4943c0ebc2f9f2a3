use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::ConfigError;

/// `(source_worker, event_name) -> {target_worker}` mapping.
///
/// Built once from the declared subscriptions and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTable {
    routes: HashMap<String, HashMap<String, BTreeSet<String>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from every worker's subscriptions.
    ///
    /// `live` holds the instantiated workers. A subscription to a worker that
    /// is only declared in `skipped` (a disabled UI) is ignored; any other
    /// unknown source is an error.
    pub fn build<'a>(
        configs: impl IntoIterator<Item = &'a WorkerConfig>,
        live: &HashSet<&str>,
        skipped: &HashSet<&str>,
    ) -> Result<Self, ConfigError> {
        let mut table = Self::new();

        for config in configs {
            if !live.contains(config.name.as_str()) {
                debug!(worker = %config.name, "Worker not instantiated, skipping its routes");
                continue;
            }

            for subscription in &config.events {
                if !live.contains(subscription.source.as_str()) {
                    if skipped.contains(subscription.source.as_str()) {
                        warn!(
                            worker = %config.name,
                            source_worker = %subscription.source,
                            "Source worker is declared but not running, skipping route"
                        );
                        continue;
                    }
                    return Err(ConfigError::UnknownEventSource {
                        worker: config.name.clone(),
                        source_worker: subscription.source.clone(),
                    });
                }

                table.add(&subscription.source, &subscription.event, &config.name);
                debug!(
                    "Added route: event '{}' from '{}' -> '{}'",
                    subscription.event, subscription.source, config.name
                );
            }
        }

        info!(routes = table.len(), event_types = table.event_types(), "Built event routes");
        Ok(table)
    }

    pub fn add(&mut self, source: &str, event: &str, target: &str) {
        self.routes
            .entry(source.to_string())
            .or_default()
            .entry(event.to_string())
            .or_default()
            .insert(target.to_string());
    }

    /// Workers subscribed to `event` from `source`
    pub fn targets(&self, source: &str, event: &str) -> Option<&BTreeSet<String>> {
        self.routes.get(source).and_then(|events| events.get(event))
    }

    /// Total number of `(source, event) -> target` routes
    pub fn len(&self) -> usize {
        self.routes
            .values()
            .flat_map(|events| events.values())
            .map(BTreeSet::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct `(source, event)` pairs
    pub fn event_types(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }
}
