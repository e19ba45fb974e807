//! # Design
//!
//! - Provide structured, constant-message errors for the pipeline.
//! - Capture operation context (paths, operations) to make failures
//!   reproducible in tests.
//! - Preserve source errors without interpolating context into error messages.

use std::error::Error;
use std::io;
use std::path::PathBuf;

use thiserror::Error as ThisError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors produced by the watch/compress/publish pipeline.
#[derive(Debug, ThisError)]
pub enum PipelineError {
    /// IO failures while interacting with the filesystem.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Reading the source map file failed; the job is abandoned without retry
    /// and re-detected by a later watcher tick if the file still exists.
    #[error("source read failure")]
    Source {
        /// Operation that triggered the read failure.
        operation: &'static str,
        /// Source path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Writing or encoding the staged artifact failed; retried a bounded
    /// number of times before the job is abandoned.
    #[error("artifact staging failure")]
    Stage {
        /// Operation that triggered the staging failure.
        operation: &'static str,
        /// Staging path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Globset compilation failures.
    #[error("pipeline glob failure")]
    Glob {
        /// Pattern that failed to compile.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// Applying destination ownership to a staged artifact failed.
    #[error("ownership apply failure")]
    Ownership {
        /// Path the ownership change targeted.
        path: PathBuf,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// Renaming a staged artifact into its final name failed.
    #[error("artifact rename failure")]
    Rename {
        /// Staged path the rename started from.
        from: PathBuf,
        /// Final artifact path the rename targeted.
        to: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Operation is not supported on the current platform.
    #[error("unsupported platform operation")]
    Unsupported {
        /// Operation that is unsupported.
        operation: &'static str,
    },
    /// Shutdown grace expired with workers still running.
    #[error("shutdown grace expired")]
    ShutdownTimeout {
        /// Number of workers that were force-cancelled.
        cancelled: usize,
    },
}

impl PipelineError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn source_read(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Source {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn stage(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Stage {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether a bounded retry may succeed (staging failures only; source
    /// read failures are left to the next watcher tick).
    #[must_use]
    pub(crate) const fn retryable(&self) -> bool {
        matches!(self, Self::Stage { .. })
    }

    /// One-line failure detail combining the constant message with the source
    /// error, for events and logs.
    #[must_use]
    pub fn detail(&self) -> String {
        self.source()
            .map_or_else(|| self.to_string(), |source| format!("{self}: {source}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_are_retryable() {
        let err = PipelineError::stage("compress.encode", "/tmp/.m.part", io::Error::other("io"));
        assert!(err.retryable());
        assert!(err.source().is_some());
    }

    #[test]
    fn source_errors_are_not_retryable() {
        let err = PipelineError::source_read(
            "compress.open_source",
            "/srv/maps/de_dust2.bsp",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(!err.retryable());
    }

    #[test]
    fn detail_appends_source_error() {
        let err = PipelineError::io("watch.read_dir", "/srv/maps", io::Error::other("denied"));
        assert_eq!(err.detail(), "pipeline io failure: denied");
    }
}
