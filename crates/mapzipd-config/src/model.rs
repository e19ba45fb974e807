//! Registry data model: watch rules and global tunables.

use std::path::PathBuf;
use std::time::Duration;

/// One watched source directory paired with its publication destination.
///
/// Immutable for the process lifetime; the pipeline treats rules as read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRule {
    /// Directory containing map files to distribute.
    pub source_dir: PathBuf,
    /// Web-served directory that receives the compressed artifacts.
    pub dest_dir: PathBuf,
    /// Glob matched against source file base names (e.g. `*.bsp`).
    pub pattern: String,
}

impl WatchRule {
    /// Construct a rule from its parts.
    #[must_use]
    pub fn new(
        source_dir: impl Into<PathBuf>,
        dest_dir: impl Into<PathBuf>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            pattern: pattern.into(),
        }
    }
}

/// Global pipeline tunables supplied once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Cadence of each rule's directory poll.
    pub poll_interval: Duration,
    /// Number of concurrent compression workers.
    pub worker_concurrency: usize,
    /// Bound of the shared compression job queue.
    pub queue_capacity: usize,
    /// How long `stop_all` waits for in-flight jobs before cancelling them.
    pub shutdown_grace: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            worker_concurrency: 4,
            queue_capacity: 256,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// The full watch-rule registry consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    /// Ordered set of watch rules.
    pub rules: Vec<WatchRule>,
    /// Global tunables shared by all rules.
    pub settings: Settings,
}

impl Registry {
    /// Construct a registry from rules and default tunables.
    #[must_use]
    pub fn with_rules(rules: Vec<WatchRule>) -> Self {
        Self {
            rules,
            settings: Settings::default(),
        }
    }
}
