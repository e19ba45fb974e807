//! Pipeline lifecycle: one watcher task per rule, a shared bounded job
//! queue, and a fixed pool of compression workers.
//!
//! The queue is the only structure shared between watchers and workers;
//! shutdown flows through a watch signal and queue closure rather than any
//! shared flags.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mapzipd_config::Registry;
use mapzipd_events::{Event, EventBus};
use mapzipd_telemetry::Metrics;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::job::STAGE_SUFFIX;
use crate::publish::{DestinationPolicy, UnixDestinationPolicy};
use crate::watcher::DirectoryWatcher;
use crate::worker::run_worker;

/// The core pipeline, constructed once from a validated registry.
pub struct PipelineService {
    registry: Registry,
    events: EventBus,
    metrics: Metrics,
    policy: Arc<dyn DestinationPolicy>,
}

impl PipelineService {
    /// Construct a pipeline using the production ownership policy.
    #[must_use]
    pub fn new(registry: Registry, events: EventBus, metrics: Metrics) -> Self {
        Self::with_policy(registry, events, metrics, Arc::new(UnixDestinationPolicy))
    }

    /// Construct a pipeline with a substituted ownership policy, letting test
    /// suites observe and fake privileged operations.
    #[must_use]
    pub fn with_policy(
        registry: Registry,
        events: EventBus,
        metrics: Metrics,
        policy: Arc<dyn DestinationPolicy>,
    ) -> Self {
        Self {
            registry,
            events,
            metrics,
            policy,
        }
    }

    /// Spawn one watcher task per rule and the worker pool.
    ///
    /// # Errors
    ///
    /// Returns an error if a rule's glob pattern fails to compile.
    pub fn start_all(&self) -> PipelineResult<PipelineHandle> {
        let settings = &self.registry.settings;
        let (job_tx, job_rx) = mpsc::channel(settings.queue_capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (stop_tx, stop_rx) = watch::channel(false);

        // Compile every rule before spawning anything so a bad pattern
        // cannot leave a partial set of watchers running.
        let mut watchers = Vec::with_capacity(self.registry.rules.len());
        let mut dest_dirs: Vec<PathBuf> = Vec::new();
        for rule in &self.registry.rules {
            if !dest_dirs.contains(&rule.dest_dir) {
                dest_dirs.push(rule.dest_dir.clone());
            }
            watchers.push(DirectoryWatcher::new(
                rule.clone(),
                job_tx.clone(),
                self.events.clone(),
                self.metrics.clone(),
            )?);
        }

        let watcher_handles = watchers
            .into_iter()
            .map(|watcher| tokio::spawn(watcher.run(settings.poll_interval, stop_rx.clone())))
            .collect();
        // Watchers hold the only senders; once they stop, the queue closes
        // and the workers drain whatever remains.
        drop(job_tx);

        let mut worker_handles = Vec::with_capacity(settings.worker_concurrency);
        for worker_id in 0..settings.worker_concurrency {
            worker_handles.push(tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&job_rx),
                Arc::clone(&self.policy),
                self.events.clone(),
                self.metrics.clone(),
            )));
        }

        info!(
            rules = self.registry.rules.len(),
            workers = settings.worker_concurrency,
            poll_interval = ?settings.poll_interval,
            "pipeline started"
        );

        Ok(PipelineHandle {
            stop: stop_tx,
            watcher_handles,
            worker_handles,
            dest_dirs,
            events: self.events.clone(),
        })
    }
}

/// Handle to a running pipeline, consumed by `stop_all`.
#[derive(Debug)]
pub struct PipelineHandle {
    stop: watch::Sender<bool>,
    watcher_handles: Vec<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
    dest_dirs: Vec<PathBuf>,
    events: EventBus,
}

impl PipelineHandle {
    /// Stop watchers, drain workers up to `grace`, then cancel stragglers.
    ///
    /// Watchers stop scheduling ticks immediately; in-flight jobs may finish
    /// within the grace period. Cancelled jobs leave no staged files behind:
    /// anything still hidden under a `.part` name is swept before returning.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShutdownTimeout`] when the grace period
    /// expired and workers had to be cancelled.
    pub async fn stop_all(mut self, grace: Duration) -> PipelineResult<()> {
        let _ = self.stop.send(true);
        for handle in self.watcher_handles.drain(..) {
            if let Err(err) = handle.await {
                warn!(error = %err, "watcher task join failed");
            }
        }

        let deadline = Instant::now() + grace;
        let mut cancelled = 0usize;
        for mut handle in self.worker_handles.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(error = %err, "worker task join failed");
                }
                Err(_elapsed) => {
                    handle.abort();
                    let _ = handle.await;
                    cancelled += 1;
                }
            }
        }

        if cancelled > 0 {
            warn!(cancelled, "shutdown grace expired; workers cancelled");
            let _ = self
                .events
                .publish(Event::ShutdownTimedOut {
                    cancelled_workers: cancelled,
                });
            self.sweep_stages();
            return Err(PipelineError::ShutdownTimeout { cancelled });
        }

        info!("pipeline stopped");
        Ok(())
    }

    /// Remove staging files abandoned by cancelled workers. Only hidden
    /// `.part` names are touched; published artifacts are never candidates.
    fn sweep_stages(&self) {
        for dest_dir in &self.dest_dirs {
            let Ok(entries) = std::fs::read_dir(dest_dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if name.starts_with('.')
                    && name.ends_with(STAGE_SUFFIX)
                    && let Err(err) = std::fs::remove_file(entry.path())
                {
                    warn!(
                        path = %entry.path().display(),
                        error = %err,
                        "failed to sweep staging file"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use mapzipd_config::{Settings, WatchRule};
    use std::fs;
    use tempfile::TempDir;

    type TestResult<T> = Result<T>;

    fn quick_registry(rules: Vec<WatchRule>) -> Registry {
        Registry {
            rules,
            settings: Settings {
                poll_interval: Duration::from_millis(25),
                worker_concurrency: 2,
                queue_capacity: 16,
                shutdown_grace: Duration::from_secs(5),
            },
        }
    }

    #[tokio::test]
    async fn start_all_rejects_bad_patterns() -> TestResult<()> {
        let temp = TempDir::new()?;
        let registry = quick_registry(vec![WatchRule::new(
            temp.path().join("maps"),
            temp.path().join("fastdownload"),
            "[",
        )]);
        let service =
            PipelineService::new(registry, EventBus::with_capacity(16), Metrics::new()?);

        let err = service.start_all().unwrap_err();
        assert!(matches!(err, PipelineError::Glob { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn stop_all_quiesces_an_idle_pipeline() -> TestResult<()> {
        let temp = TempDir::new()?;
        let source = temp.path().join("maps");
        let dest = temp.path().join("fastdownload");
        fs::create_dir_all(&source)?;
        fs::create_dir_all(&dest)?;
        let registry = quick_registry(vec![WatchRule::new(&source, &dest, "*.bsp")]);
        let service =
            PipelineService::new(registry, EventBus::with_capacity(16), Metrics::new()?);

        let handle = service.start_all()?;
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.stop_all(Duration::from_secs(5)).await?;
        Ok(())
    }

    #[test]
    fn sweep_removes_only_hidden_part_files() -> TestResult<()> {
        let temp = TempDir::new()?;
        let dest = temp.path().join("fastdownload");
        fs::create_dir_all(&dest)?;
        fs::write(dest.join(".de_dust2.bsp.bz2.abc123.part"), b"partial")?;
        fs::write(dest.join("de_dust2.bsp.bz2"), b"published")?;

        let (stop, _) = watch::channel(false);
        let handle = PipelineHandle {
            stop,
            watcher_handles: Vec::new(),
            worker_handles: Vec::new(),
            dest_dirs: vec![dest.clone()],
            events: EventBus::with_capacity(4),
        };
        handle.sweep_stages();

        assert!(!dest.join(".de_dust2.bsp.bz2.abc123.part").exists());
        assert!(dest.join("de_dust2.bsp.bz2").exists());
        Ok(())
    }
}
