//! Error types for registry configuration.
//!
//! # Design
//! - Constant error messages with structured context fields.
//! - Every variant is fatal: a registry that fails to load or validate stops
//!   the daemon before any watcher starts.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while loading or validating the watch-rule registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO failure while reading the configuration file.
    #[error("config io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The configuration file was not valid JSON for the expected shape.
    #[error("config parse failure")]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A watch rule failed validation.
    #[error("invalid watch rule")]
    InvalidRule {
        /// Zero-based index of the rule in the registry.
        index: usize,
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Two rules share the same source and destination pair.
    #[error("duplicate watch rule")]
    DuplicateRule {
        /// Zero-based index of the second occurrence.
        index: usize,
        /// Source directory of the duplicated pair.
        source_dir: PathBuf,
        /// Destination directory of the duplicated pair.
        dest_dir: PathBuf,
    },
    /// A rule's glob pattern failed to compile.
    #[error("invalid watch pattern")]
    Pattern {
        /// Zero-based index of the rule in the registry.
        index: usize,
        /// Pattern that failed to compile.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// A global tunable failed validation.
    #[error("invalid settings field")]
    InvalidSettings {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
}

impl ConfigError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_helper_builds_variant_with_source() {
        let err = ConfigError::io("load.read", "/etc/mapzipd.conf", io::Error::other("io"));
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "config io failure");
    }
}
