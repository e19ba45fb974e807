//! Per-rule directory polling.
//!
//! Each watch rule runs as an independent task: a tick lists the source
//! directory, compares every matching regular file against the rule's version
//! map, and enqueues a compression job for each unseen or changed version.
//! Failures degrade the single rule and are retried on the next tick; no
//! rule's backlog or breakage ever delays another rule.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use globset::{Glob, GlobMatcher};
use mapzipd_config::WatchRule;
use mapzipd_events::{Event, EventBus};
use mapzipd_telemetry::Metrics;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::job::{CompressionJob, FileVersion};

pub(crate) struct DirectoryWatcher {
    rule: WatchRule,
    matcher: GlobMatcher,
    state: HashMap<PathBuf, FileVersion>,
    queue: Sender<CompressionJob>,
    events: EventBus,
    metrics: Metrics,
    degraded: bool,
}

impl DirectoryWatcher {
    pub(crate) fn new(
        rule: WatchRule,
        queue: Sender<CompressionJob>,
        events: EventBus,
        metrics: Metrics,
    ) -> PipelineResult<Self> {
        let matcher = Glob::new(&rule.pattern)
            .map_err(|source| PipelineError::Glob {
                pattern: rule.pattern.clone(),
                source,
            })?
            .compile_matcher();
        Ok(Self {
            rule,
            matcher,
            state: HashMap::new(),
            queue,
            events,
            metrics,
            degraded: false,
        })
    }

    /// Poll until the stop signal fires or the job queue closes.
    pub(crate) async fn run(mut self, poll_interval: Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.tick().await.is_break() {
                        break;
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(source = %self.rule.source_dir.display(), "watcher stopped");
    }

    async fn tick(&mut self) -> ControlFlow<()> {
        let listing = match self.list_matching().await {
            Ok(listing) => {
                self.mark_recovered();
                listing
            }
            Err(err) => {
                self.mark_degraded(&err);
                return ControlFlow::Continue(());
            }
        };

        // Prune deleted paths so a later recreation counts as a new version.
        self.state.retain(|path, _| listing.contains_key(path));

        for (path, version) in listing {
            if self.state.get(&path) == Some(&version) {
                continue;
            }
            let Some(job) = CompressionJob::for_source(
                path.clone(),
                self.rule.dest_dir.clone(),
                version,
            ) else {
                warn!(
                    path = %path.display(),
                    "source file name is not valid UTF-8; skipping"
                );
                continue;
            };
            let job_id = job.id;
            match self.queue.try_send(job) {
                Ok(()) => {
                    // Recorded only after a successful enqueue so a refused
                    // job is re-detected by a later tick.
                    self.state.insert(path.clone(), version);
                    self.metrics.inc_job_enqueued();
                    let _ = self.events.publish(Event::MapDetected {
                        job_id,
                        source_path: path.to_string_lossy().into_owned(),
                    });
                    debug!(
                        job_id = %job_id,
                        path = %path.display(),
                        "map version enqueued"
                    );
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        path = %path.display(),
                        "job queue full; retrying on a later tick"
                    );
                }
                Err(TrySendError::Closed(_)) => return ControlFlow::Break(()),
            }
        }

        self.metrics.inc_watch_tick(&self.source_label());
        ControlFlow::Continue(())
    }

    async fn list_matching(&self) -> PipelineResult<HashMap<PathBuf, FileVersion>> {
        let source_dir = &self.rule.source_dir;
        let mut entries = tokio::fs::read_dir(source_dir)
            .await
            .map_err(|err| PipelineError::io("watch.read_dir", source_dir, err))?;

        let mut listing = HashMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| PipelineError::io("watch.read_entry", source_dir, err))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !self.matcher.is_match(name) {
                continue;
            }
            // Entries can vanish between listing and stat; skip and let the
            // next tick settle it.
            let Ok(metadata) = entry.metadata().await else {
                debug!(path = %entry.path().display(), "stat failed; skipping entry");
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(version) = FileVersion::from_metadata(&metadata) else {
                continue;
            };
            listing.insert(entry.path(), version);
        }
        Ok(listing)
    }

    fn mark_degraded(&mut self, err: &PipelineError) {
        self.metrics.inc_watch_error(&self.source_label());
        if self.degraded {
            warn!(
                source = %self.rule.source_dir.display(),
                error = %err.detail(),
                "source directory still unreadable"
            );
        } else {
            self.degraded = true;
            warn!(
                source = %self.rule.source_dir.display(),
                error = %err.detail(),
                "source directory unreadable; retrying every tick"
            );
            let _ = self.events.publish(Event::WatchDegraded {
                source_dir: self.source_label(),
                message: err.detail(),
            });
        }
    }

    fn mark_recovered(&mut self) {
        if std::mem::take(&mut self.degraded) {
            info!(
                source = %self.rule.source_dir.display(),
                "source directory readable again"
            );
            let _ = self.events.publish(Event::WatchRecovered {
                source_dir: self.source_label(),
            });
        }
    }

    fn source_label(&self) -> String {
        self.rule.source_dir.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    type TestResult<T> = Result<T>;

    struct Harness {
        watcher: DirectoryWatcher,
        jobs: mpsc::Receiver<CompressionJob>,
        _temp: TempDir,
        source_dir: PathBuf,
    }

    fn harness(queue_capacity: usize) -> TestResult<Harness> {
        let temp = TempDir::new()?;
        let source_dir = temp.path().join("maps");
        let dest_dir = temp.path().join("fastdownload");
        fs::create_dir_all(&source_dir)?;
        fs::create_dir_all(&dest_dir)?;
        let rule = WatchRule::new(&source_dir, &dest_dir, "*.bsp");
        let (tx, jobs) = mpsc::channel(queue_capacity);
        let watcher =
            DirectoryWatcher::new(rule, tx, EventBus::with_capacity(64), Metrics::new()?)?;
        Ok(Harness {
            watcher,
            jobs,
            _temp: temp,
            source_dir,
        })
    }

    #[tokio::test]
    async fn first_tick_enqueues_matching_files_only() -> TestResult<()> {
        let mut h = harness(8)?;
        fs::write(h.source_dir.join("de_dust2.bsp"), b"VBSP")?;
        fs::write(h.source_dir.join("server.cfg"), b"hostname")?;

        assert!(h.watcher.tick().await.is_continue());

        let job = h.jobs.try_recv()?;
        assert!(job.source_path.ends_with("de_dust2.bsp"));
        assert_eq!(job.artifact_name, "de_dust2.bsp.bz2");
        assert!(h.jobs.try_recv().is_err(), "non-matching file enqueued");
        Ok(())
    }

    #[tokio::test]
    async fn unchanged_version_is_not_re_enqueued() -> TestResult<()> {
        let mut h = harness(8)?;
        fs::write(h.source_dir.join("de_dust2.bsp"), b"VBSP")?;

        assert!(h.watcher.tick().await.is_continue());
        let _ = h.jobs.try_recv()?;

        assert!(h.watcher.tick().await.is_continue());
        assert!(h.jobs.try_recv().is_err(), "idempotence violated");
        Ok(())
    }

    #[tokio::test]
    async fn touched_file_is_a_new_version() -> TestResult<()> {
        let mut h = harness(8)?;
        let map = h.source_dir.join("de_dust2.bsp");
        fs::write(&map, b"VBSP")?;

        assert!(h.watcher.tick().await.is_continue());
        let first = h.jobs.try_recv()?;

        // Re-write with identical content but a strictly newer mtime.
        let later = std::time::SystemTime::now() + Duration::from_secs(2);
        fs::write(&map, b"VBSP")?;
        let file = fs::File::options().append(true).open(&map)?;
        file.set_modified(later)?;
        drop(file);

        assert!(h.watcher.tick().await.is_continue());
        let second = h.jobs.try_recv()?;
        assert_ne!(first.version, second.version);
        Ok(())
    }

    #[tokio::test]
    async fn deleted_then_recreated_path_is_a_new_version() -> TestResult<()> {
        let mut h = harness(8)?;
        let map = h.source_dir.join("de_dust2.bsp");
        fs::write(&map, b"VBSP")?;

        assert!(h.watcher.tick().await.is_continue());
        let _ = h.jobs.try_recv()?;

        fs::remove_file(&map)?;
        assert!(h.watcher.tick().await.is_continue());
        assert!(h.watcher.state.is_empty(), "deleted path not pruned");

        fs::write(&map, b"VBSP")?;
        assert!(h.watcher.tick().await.is_continue());
        assert!(h.jobs.try_recv().is_ok(), "recreation not re-enqueued");
        Ok(())
    }

    #[tokio::test]
    async fn full_queue_leaves_version_unrecorded_for_retry() -> TestResult<()> {
        let mut h = harness(1)?;
        fs::write(h.source_dir.join("de_dust2.bsp"), b"VBSP")?;
        fs::write(h.source_dir.join("de_inferno.bsp"), b"VBSP")?;

        assert!(h.watcher.tick().await.is_continue());
        assert_eq!(h.watcher.state.len(), 1, "only the enqueued job recorded");

        // Drain the queue; the refused file is picked up on the next tick.
        let _ = h.jobs.try_recv()?;
        assert!(h.watcher.tick().await.is_continue());
        assert_eq!(h.watcher.state.len(), 2);
        let _ = h.jobs.try_recv()?;
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_source_degrades_and_recovers() -> TestResult<()> {
        let mut h = harness(8)?;
        let events = h.watcher.events.clone();
        let mut stream = events.subscribe(None);
        fs::remove_dir_all(&h.source_dir)?;

        assert!(h.watcher.tick().await.is_continue());
        assert!(h.watcher.degraded);
        let degraded = stream.next().await.expect("degraded event");
        assert_eq!(degraded.event.kind(), "watch_degraded");

        fs::create_dir_all(&h.source_dir)?;
        assert!(h.watcher.tick().await.is_continue());
        assert!(!h.watcher.degraded);
        let recovered = stream.next().await.expect("recovered event");
        assert_eq!(recovered.event.kind(), "watch_recovered");
        Ok(())
    }

    #[tokio::test]
    async fn closed_queue_stops_the_watcher() -> TestResult<()> {
        let mut h = harness(8)?;
        fs::write(h.source_dir.join("de_dust2.bsp"), b"VBSP")?;
        h.jobs.close();

        assert!(h.watcher.tick().await.is_break());
        Ok(())
    }
}
