//! Bounded-concurrency compression workers.
//!
//! Workers share a single queue receiver; each consumed job is checked
//! against the destination for freshness, compressed into a hidden staging
//! file, and handed to the publisher. Every terminal outcome is reported on
//! the event bus and counted in metrics; a failed job never affects its
//! siblings.

use std::sync::Arc;

use mapzipd_events::{Event, EventBus};
use mapzipd_telemetry::Metrics;
use tokio::sync::Mutex;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::compress::{artifact_current, discard_stage, stage_artifact};
use crate::job::CompressionJob;
use crate::publish::{DestinationPolicy, publish_artifact};

pub(crate) async fn run_worker(
    worker_id: usize,
    queue: Arc<Mutex<Receiver<CompressionJob>>>,
    policy: Arc<dyn DestinationPolicy>,
    events: EventBus,
    metrics: Metrics,
) {
    loop {
        let job = { queue.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        process_job(&job, policy.as_ref(), &events, &metrics).await;
    }
    debug!(worker_id, "compression worker drained");
}

pub(crate) async fn process_job(
    job: &CompressionJob,
    policy: &dyn DestinationPolicy,
    events: &EventBus,
    metrics: &Metrics,
) {
    if artifact_current(job) {
        debug!(
            job_id = %job.id,
            artifact = %job.artifact_path().display(),
            "artifact already current; skipping"
        );
        let _ = events.publish(Event::CompressionSkipped {
            job_id: job.id,
            reason: "artifact_up_to_date".to_string(),
        });
        metrics.inc_job_outcome("up_to_date");
        return;
    }

    let _ = events.publish(Event::CompressionStarted { job_id: job.id });

    let staged = match stage_artifact(job).await {
        Ok(staged) => {
            // A sibling worker may have published a newer version of the
            // same path while this job was compressing; renaming over it
            // would regress the artifact.
            if artifact_current(job) {
                discard_stage(&staged);
                debug!(job_id = %job.id, "artifact superseded while compressing");
                let _ = events.publish(Event::CompressionSkipped {
                    job_id: job.id,
                    reason: "superseded_by_newer_version".to_string(),
                });
                metrics.inc_job_outcome("up_to_date");
                return;
            }
            staged
        }
        Err(err) => {
            warn!(
                job_id = %job.id,
                source = %job.source_path.display(),
                error = %err.detail(),
                "compression failed; job abandoned"
            );
            let _ = events.publish(Event::JobFailed {
                job_id: job.id,
                stage: "compress".to_string(),
                message: err.detail(),
            });
            metrics.inc_job_outcome("compress_failed");
            return;
        }
    };

    match publish_artifact(policy, job, &staged) {
        Ok(artifact) => {
            info!(
                job_id = %job.id,
                artifact = %artifact.display(),
                "artifact published"
            );
            let _ = events.publish(Event::ArtifactPublished {
                job_id: job.id,
                artifact_path: artifact.to_string_lossy().into_owned(),
            });
            metrics.inc_job_outcome("published");
        }
        Err(err) => {
            warn!(
                job_id = %job.id,
                artifact = %job.artifact_path().display(),
                error = %err.detail(),
                "publication failed; job abandoned"
            );
            let _ = events.publish(Event::JobFailed {
                job_id: job.id,
                stage: "publish".to_string(),
                message: err.detail(),
            });
            metrics.inc_job_outcome("publish_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    use crate::error::PipelineResult;
    use crate::job::FileVersion;
    use crate::publish::DestinationAttrs;

    type TestResult<T> = Result<T>;

    struct PassthroughPolicy;

    impl DestinationPolicy for PassthroughPolicy {
        fn probe(&self, _dest_dir: &Path) -> PipelineResult<DestinationAttrs> {
            Ok(DestinationAttrs {
                uid: 0,
                gid: 0,
                mode: 0o644,
            })
        }

        fn apply(&self, _path: &Path, _attrs: &DestinationAttrs) -> PipelineResult<()> {
            Ok(())
        }
    }

    fn job_in(temp: &TempDir, contents: &[u8]) -> TestResult<CompressionJob> {
        let source_dir = temp.path().join("maps");
        let dest_dir = temp.path().join("fastdownload");
        fs::create_dir_all(&source_dir)?;
        fs::create_dir_all(&dest_dir)?;
        let source_path = source_dir.join("de_dust2.bsp");
        fs::write(&source_path, contents)?;
        let version = FileVersion::from_metadata(&fs::metadata(&source_path)?)?;
        Ok(CompressionJob::for_source(source_path, dest_dir, version).expect("utf-8 name"))
    }

    #[tokio::test]
    async fn job_flows_to_a_published_artifact() -> TestResult<()> {
        let temp = TempDir::new()?;
        let job = job_in(&temp, b"VBSP")?;
        let events = EventBus::with_capacity(16);
        let metrics = Metrics::new()?;
        let mut stream = events.subscribe(None);

        process_job(&job, &PassthroughPolicy, &events, &metrics).await;

        assert!(job.artifact_path().exists());
        assert!(!job.stage_path().exists());
        let started = stream.next().await.expect("started event");
        assert_eq!(started.event.kind(), "compression_started");
        let published = stream.next().await.expect("published event");
        assert_eq!(published.event.kind(), "artifact_published");
        assert_eq!(metrics.jobs_backlog(), -1, "one terminal outcome recorded");
        Ok(())
    }

    #[tokio::test]
    async fn current_artifact_short_circuits_as_skip() -> TestResult<()> {
        let temp = TempDir::new()?;
        let job = job_in(&temp, b"VBSP")?;
        fs::write(job.artifact_path(), b"already compressed")?;
        let events = EventBus::with_capacity(16);
        let metrics = Metrics::new()?;
        let mut stream = events.subscribe(None);

        process_job(&job, &PassthroughPolicy, &events, &metrics).await;

        let skipped = stream.next().await.expect("skipped event");
        assert_eq!(skipped.event.kind(), "compression_skipped");
        assert_eq!(
            fs::read(job.artifact_path())?,
            b"already compressed",
            "no redundant recompression"
        );
        Ok(())
    }

    #[tokio::test]
    async fn vanished_source_reports_a_compress_failure() -> TestResult<()> {
        let temp = TempDir::new()?;
        let job = job_in(&temp, b"VBSP")?;
        fs::remove_file(&job.source_path)?;
        let events = EventBus::with_capacity(16);
        let metrics = Metrics::new()?;
        let mut stream = events.subscribe(None);

        process_job(&job, &PassthroughPolicy, &events, &metrics).await;

        let started = stream.next().await.expect("started event");
        assert_eq!(started.event.kind(), "compression_started");
        let failed = stream.next().await.expect("failed event");
        let Event::JobFailed { stage, .. } = failed.event else {
            panic!("expected job_failed, got {}", failed.event.kind());
        };
        assert_eq!(stage, "compress");
        assert!(!job.artifact_path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn workers_drain_the_queue_and_exit_on_close() -> TestResult<()> {
        let temp = TempDir::new()?;
        let job = job_in(&temp, b"VBSP")?;
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let queue = Arc::new(Mutex::new(rx));
        let events = EventBus::with_capacity(16);
        let metrics = Metrics::new()?;

        let worker = tokio::spawn(run_worker(
            0,
            queue,
            Arc::new(PassthroughPolicy),
            events,
            metrics,
        ));

        tx.send(job.clone()).await?;
        drop(tx);
        worker.await?;

        assert!(job.artifact_path().exists());
        Ok(())
    }
}
