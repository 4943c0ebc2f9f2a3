use std::collections::{BTreeSet, HashSet};
use tracing::{debug, error};

use crate::config::WorkerConfig;
use crate::error::ConfigError;

/// Check that every worker has a non-empty, unique name.
pub fn validate_names(configs: &[&WorkerConfig]) -> Result<(), ConfigError> {
    if let Some(config) = configs.iter().find(|c| c.name.trim().is_empty()) {
        return Err(ConfigError::MissingName {
            section: config.system.clone().unwrap_or_else(|| "ui".to_string()),
        });
    }

    let mut seen = HashSet::new();
    let duplicates: BTreeSet<String> = configs
        .iter()
        .filter(|c| !seen.insert(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect();

    if !duplicates.is_empty() {
        return Err(ConfigError::DuplicateNames(duplicates.into_iter().collect()));
    }
    Ok(())
}

/// Order workers so every worker comes after all of its `depends_on`.
///
/// Repeatedly scans the unresolved workers, taking each whose dependencies
/// are already resolved, in declaration order. A scan that makes no progress
/// means missing or circular dependencies; the error names every stuck worker.
pub fn resolve_order<'a>(configs: &[&'a WorkerConfig]) -> Result<Vec<&'a WorkerConfig>, ConfigError> {
    validate_names(configs)?;

    let mut resolved: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(configs.len());
    let mut pending: Vec<&'a WorkerConfig> = configs.to_vec();

    while !pending.is_empty() {
        let before = pending.len();

        pending.retain(|&config| {
            let ready = config.depends_on.iter().all(|dep| resolved.contains(dep.as_str()));
            if ready {
                debug!(worker = %config.name, "Dependencies satisfied");
                resolved.insert(config.name.as_str());
                order.push(config);
            }
            !ready
        });

        if pending.len() == before {
            let details = unresolved_details(&pending, &resolved);
            for detail in &details {
                error!("{}", detail);
            }
            return Err(ConfigError::UnresolvedDependencies { details });
        }
    }

    Ok(order)
}

fn unresolved_details(pending: &[&WorkerConfig], resolved: &HashSet<&str>) -> Vec<String> {
    let mut details: Vec<String> = pending
        .iter()
        .map(|config| {
            let missing: Vec<&str> = config
                .depends_on
                .iter()
                .map(String::as_str)
                .filter(|dep| !resolved.contains(dep))
                .collect();
            format!(
                "  - {} (depends on: {:?}, missing: {:?})",
                config.name, config.depends_on, missing
            )
        })
        .collect();
    details.sort();
    details
}
