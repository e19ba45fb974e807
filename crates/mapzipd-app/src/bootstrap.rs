//! Service wiring and signal-driven shutdown.

use std::io;

use clap::Parser;
use mapzipd_config::Registry;
use mapzipd_events::EventBus;
use mapzipd_pipeline::{PipelineError, PipelineService};
use mapzipd_telemetry::{LoggingConfig, Metrics};
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::error::{AppError, AppResult};

/// Dependencies required to bootstrap the daemon.
#[derive(Debug)]
pub(crate) struct BootstrapDependencies {
    logging: LoggingConfig<'static>,
    registry: Registry,
    events: EventBus,
    metrics: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from parsed arguments.
    pub(crate) fn from_cli(cli: &Cli) -> AppResult<Self> {
        let registry =
            Registry::load(&cli.config).map_err(|err| AppError::config("registry.load", err))?;
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            logging: LoggingConfig {
                level: "info",
                format: cli.log_format.resolve(),
            },
            registry,
            events: EventBus::new(),
            metrics,
        })
    }
}

/// Entry point for the daemon boot sequence.
///
/// # Errors
///
/// Returns an error if dependency construction or pipeline startup fails.
pub async fn run_app() -> AppResult<()> {
    let cli = Cli::parse();
    let dependencies = BootstrapDependencies::from_cli(&cli)?;
    run_app_with(dependencies).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    mapzipd_telemetry::init_logging(&dependencies.logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!("mapzipd bootstrap starting");

    let BootstrapDependencies {
        logging: _,
        registry,
        events,
        metrics,
    } = dependencies;

    let grace = registry.settings.shutdown_grace;
    let service = PipelineService::new(registry, events, metrics.clone());
    let handle = service
        .start_all()
        .map_err(|err| AppError::pipeline("pipeline.start_all", err))?;

    wait_for_shutdown_signal()
        .await
        .map_err(|source| AppError::Signal {
            operation: "signal.wait",
            source,
        })?;
    info!("shutdown signal received; stopping pipeline");

    match handle.stop_all(grace).await {
        Ok(()) => {}
        Err(PipelineError::ShutdownTimeout { cancelled }) => {
            warn!(cancelled, "pipeline stop exceeded grace; workers cancelled");
        }
        Err(err) => return Err(AppError::pipeline("pipeline.stop_all", err)),
    }

    if let Ok(rendered) = metrics.gather() {
        debug!(metrics = %rendered, "final pipeline metrics");
    }
    info!("mapzipd shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
