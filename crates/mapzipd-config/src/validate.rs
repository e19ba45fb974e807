//! Startup validation of the watch-rule registry.
//!
//! Validation checks shape only: directories are not required to exist, since
//! an unreadable source or missing destination is a retryable runtime
//! condition handled by the pipeline, not a configuration defect.

use std::collections::HashSet;

use globset::Glob;

use crate::error::{ConfigError, ConfigResult};
use crate::model::Registry;

/// Validate a registry before the pipeline consumes it.
///
/// # Errors
///
/// Returns the first violation found: empty rule set, blank or equal
/// directories, duplicate `(source_dir, dest_dir)` pairs, uncompilable
/// patterns, or out-of-range tunables.
pub fn validate_registry(registry: &Registry) -> ConfigResult<()> {
    if registry.rules.is_empty() {
        return Err(ConfigError::InvalidSettings {
            field: "rules",
            reason: "empty",
            value: None,
        });
    }

    let mut seen = HashSet::new();
    for (index, rule) in registry.rules.iter().enumerate() {
        if rule.source_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidRule {
                index,
                field: "source_dir",
                reason: "empty",
                value: None,
            });
        }
        if rule.dest_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidRule {
                index,
                field: "dest_dir",
                reason: "empty",
                value: None,
            });
        }
        if rule.source_dir == rule.dest_dir {
            return Err(ConfigError::InvalidRule {
                index,
                field: "dest_dir",
                reason: "equals_source_dir",
                value: Some(rule.dest_dir.to_string_lossy().into_owned()),
            });
        }
        if rule.pattern.trim().is_empty() {
            return Err(ConfigError::InvalidRule {
                index,
                field: "pattern",
                reason: "empty",
                value: Some(rule.pattern.clone()),
            });
        }
        Glob::new(&rule.pattern).map_err(|source| ConfigError::Pattern {
            index,
            pattern: rule.pattern.clone(),
            source,
        })?;
        if !seen.insert((rule.source_dir.clone(), rule.dest_dir.clone())) {
            return Err(ConfigError::DuplicateRule {
                index,
                source_dir: rule.source_dir.clone(),
                dest_dir: rule.dest_dir.clone(),
            });
        }
    }

    let settings = &registry.settings;
    if settings.poll_interval.is_zero() {
        return Err(ConfigError::InvalidSettings {
            field: "poll_interval",
            reason: "zero",
            value: None,
        });
    }
    if settings.worker_concurrency == 0 {
        return Err(ConfigError::InvalidSettings {
            field: "worker_concurrency",
            reason: "zero",
            value: Some(settings.worker_concurrency.to_string()),
        });
    }
    if settings.queue_capacity == 0 {
        return Err(ConfigError::InvalidSettings {
            field: "queue_capacity",
            reason: "zero",
            value: Some(settings.queue_capacity.to_string()),
        });
    }

    Ok(())
}
