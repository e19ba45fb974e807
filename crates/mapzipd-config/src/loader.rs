//! JSON configuration file loading.
//!
//! The on-disk format mirrors the in-memory model with durations expressed in
//! whole seconds; the raw serde structs are private and mapped into the model
//! after parsing so the rest of the workspace never sees file-format details.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{Registry, Settings, WatchRule};
use crate::validate::validate_registry;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    rules: Vec<RuleFile>,
    #[serde(default)]
    settings: SettingsFile,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    source_dir: PathBuf,
    dest_dir: PathBuf,
    pattern: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SettingsFile {
    poll_interval_secs: u64,
    worker_concurrency: usize,
    queue_capacity: usize,
    shutdown_grace_secs: u64,
}

impl Default for SettingsFile {
    fn default() -> Self {
        let defaults = Settings::default();
        Self {
            poll_interval_secs: defaults.poll_interval.as_secs(),
            worker_concurrency: defaults.worker_concurrency,
            queue_capacity: defaults.queue_capacity,
            shutdown_grace_secs: defaults.shutdown_grace.as_secs(),
        }
    }
}

impl Registry {
    /// Load and validate a registry from a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON for the
    /// expected shape, or fails [`validate_registry`].
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::io("registry.load.read", path, source))?;
        let file: RegistryFile = serde_json::from_str(&raw).map_err(|source| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let registry = Self {
            rules: file
                .rules
                .into_iter()
                .map(|rule| WatchRule {
                    source_dir: rule.source_dir,
                    dest_dir: rule.dest_dir,
                    pattern: rule.pattern,
                })
                .collect(),
            settings: Settings {
                poll_interval: Duration::from_secs(file.settings.poll_interval_secs),
                worker_concurrency: file.settings.worker_concurrency,
                queue_capacity: file.settings.queue_capacity,
                shutdown_grace: Duration::from_secs(file.settings.shutdown_grace_secs),
            },
        };
        validate_registry(&registry)?;
        Ok(registry)
    }
}
