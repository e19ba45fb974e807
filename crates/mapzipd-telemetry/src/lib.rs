#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Telemetry primitives shared across the mapzipd workspace.
//!
//! This crate centralises logging and metrics helpers so the daemon and its
//! tests adopt a consistent observability story.

mod error;

pub use error::{Result, TelemetryError};

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing_subscriber::{EnvFilter, fmt};

/// Default logging target when `RUST_LOG` is not provided.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be installed (for
/// example, because another subscriber has already been set globally).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level));

    let builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    }
    .map_err(|source| TelemetryError::SubscriberInstall { source })?;

    Ok(())
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: &'a str,
    /// Output format for the installed subscriber.
    pub format: LogFormat,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Machine-readable JSON lines.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Prometheus-backed metrics registry shared across the pipeline.
#[derive(Clone, Debug)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    watch_ticks_total: IntCounterVec,
    watch_errors_total: IntCounterVec,
    jobs_enqueued_total: IntCounter,
    job_outcomes_total: IntCounterVec,
    jobs_backlog: IntGauge,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let watch_ticks_total = IntCounterVec::new(
            Opts::new("watch_ticks_total", "Completed poll ticks by source"),
            &["source"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "watch_ticks_total",
            source,
        })?;
        let watch_errors_total = IntCounterVec::new(
            Opts::new(
                "watch_errors_total",
                "Failed directory listings by source",
            ),
            &["source"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "watch_errors_total",
            source,
        })?;
        let jobs_enqueued_total = IntCounter::with_opts(Opts::new(
            "jobs_enqueued_total",
            "Compression jobs submitted to the queue",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "jobs_enqueued_total",
            source,
        })?;
        let job_outcomes_total = IntCounterVec::new(
            Opts::new("job_outcomes_total", "Terminal job outcomes by status"),
            &["status"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "job_outcomes_total",
            source,
        })?;
        let jobs_backlog = IntGauge::with_opts(Opts::new(
            "jobs_backlog",
            "Jobs enqueued or executing that have not reached a terminal outcome",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "jobs_backlog",
            source,
        })?;

        register(&registry, "watch_ticks_total", watch_ticks_total.clone())?;
        register(&registry, "watch_errors_total", watch_errors_total.clone())?;
        register(&registry, "jobs_enqueued_total", jobs_enqueued_total.clone())?;
        register(&registry, "job_outcomes_total", job_outcomes_total.clone())?;
        register(&registry, "jobs_backlog", jobs_backlog.clone())?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                watch_ticks_total,
                watch_errors_total,
                jobs_enqueued_total,
                job_outcomes_total,
                jobs_backlog,
            }),
        })
    }

    /// Increment the completed tick counter for the given source directory.
    pub fn inc_watch_tick(&self, source: &str) {
        self.inner
            .watch_ticks_total
            .with_label_values(&[source])
            .inc();
    }

    /// Increment the failed listing counter for the given source directory.
    pub fn inc_watch_error(&self, source: &str) {
        self.inner
            .watch_errors_total
            .with_label_values(&[source])
            .inc();
    }

    /// Record a job submitted to the queue.
    pub fn inc_job_enqueued(&self) {
        self.inner.jobs_enqueued_total.inc();
        self.inner.jobs_backlog.inc();
    }

    /// Record a job reaching a terminal outcome
    /// (`published`, `up_to_date`, `compress_failed`, `publish_failed`).
    pub fn inc_job_outcome(&self, status: &str) {
        self.inner
            .job_outcomes_total
            .with_label_values(&[status])
            .inc();
        self.inner.jobs_backlog.dec();
    }

    /// Current backlog gauge value, exposed for tests and health reporting.
    #[must_use]
    pub fn jobs_backlog(&self) -> i64 {
        self.inner.jobs_backlog.get()
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not valid UTF-8.
    pub fn gather(&self) -> Result<String> {
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }
}

fn register<C>(registry: &Registry, name: &'static str, collector: C) -> Result<()>
where
    C: prometheus::core::Collector + 'static,
{
    registry
        .register(Box::new(collector))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_render() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_watch_tick("/srv/gameserver_0/maps");
        metrics.inc_job_enqueued();
        metrics.inc_job_outcome("published");

        let rendered = metrics.gather()?;
        assert!(rendered.contains("watch_ticks_total"));
        assert!(rendered.contains("jobs_enqueued_total"));
        assert!(rendered.contains("job_outcomes_total"));
        Ok(())
    }

    #[test]
    fn backlog_tracks_enqueue_and_outcome() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_job_enqueued();
        metrics.inc_job_enqueued();
        assert_eq!(metrics.jobs_backlog(), 2);
        metrics.inc_job_outcome("up_to_date");
        assert_eq!(metrics.jobs_backlog(), 1);
        Ok(())
    }

    #[test]
    fn log_format_infers_from_build_profile() {
        let format = LogFormat::infer();
        if cfg!(debug_assertions) {
            assert_eq!(format, LogFormat::Pretty);
        } else {
            assert_eq!(format, LogFormat::Json);
        }
    }
}
