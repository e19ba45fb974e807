//! Staged bzip2 compression of source map files.
//!
//! Compression streams the source through a bzip2 encoder into a hidden
//! `.part` file beside the final artifact. Source read failures abandon the
//! job immediately (the next watcher tick re-detects the file); staging
//! failures such as a full disk are retried a bounded number of times with
//! doubling backoff.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bzip2::Compression;
use bzip2::write::BzEncoder;
use tokio::task;
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};
use crate::job::CompressionJob;

const STAGE_ATTEMPTS: u32 = 3;
const STAGE_BACKOFF: Duration = Duration::from_millis(100);
const COPY_BUFFER_LEN: usize = 64 * 1024;

/// Whether the destination already holds an artifact at least as new as the
/// job's source version.
///
/// Covers restart-after-crash and duplicate ticks: the watcher state map is
/// not persisted, so the first tick after a restart re-enqueues everything it
/// sees and the worker discards the jobs whose artifact is already current.
pub(crate) fn artifact_current(job: &CompressionJob) -> bool {
    let Ok(metadata) = fs::metadata(job.artifact_path()) else {
        return false;
    };
    let Ok(artifact_modified) = metadata.modified() else {
        return false;
    };
    artifact_modified >= job.version.modified
}

/// Compress the job's source into its staging path, retrying bounded staging
/// failures. On success the staged file is complete and flushed; on error no
/// partial staging file remains.
pub(crate) async fn stage_artifact(job: &CompressionJob) -> PipelineResult<PathBuf> {
    let stage = job.stage_path();
    let mut attempt = 1u32;
    loop {
        let source = job.source_path.clone();
        let target = stage.clone();
        let result = task::spawn_blocking(move || compress_file(&source, &target)).await;

        let err = match result {
            Ok(Ok(_bytes)) => return Ok(stage),
            Ok(Err(err)) => err,
            Err(join_err) => {
                PipelineError::stage("compress.join", &stage, io::Error::other(join_err))
            }
        };

        discard_stage(&stage);
        if !err.retryable() || attempt >= STAGE_ATTEMPTS {
            return Err(err);
        }
        let backoff = STAGE_BACKOFF * 2u32.pow(attempt - 1);
        warn!(
            attempt,
            backoff = ?backoff,
            source = %job.source_path.display(),
            error = %err.detail(),
            "artifact staging failed; backing off"
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Remove a staging file, tolerating its absence.
pub(crate) fn discard_stage(stage: &Path) {
    if let Err(err) = fs::remove_file(stage)
        && err.kind() != io::ErrorKind::NotFound
    {
        warn!(
            path = %stage.display(),
            error = %err,
            "failed to remove staging file"
        );
    }
}

fn compress_file(source: &Path, stage: &Path) -> PipelineResult<u64> {
    let input = File::open(source)
        .map_err(|err| PipelineError::source_read("compress.open_source", source, err))?;
    let mut reader = BufReader::new(input);

    let output = File::create(stage)
        .map_err(|err| PipelineError::stage("compress.create_stage", stage, err))?;
    let mut encoder = BzEncoder::new(BufWriter::new(output), Compression::best());

    let mut buffer = vec![0u8; COPY_BUFFER_LEN];
    let mut total = 0u64;
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|err| PipelineError::source_read("compress.read_source", source, err))?;
        if read == 0 {
            break;
        }
        encoder
            .write_all(&buffer[..read])
            .map_err(|err| PipelineError::stage("compress.encode", stage, err))?;
        total += read as u64;
    }

    let writer = encoder
        .finish()
        .map_err(|err| PipelineError::stage("compress.finish", stage, err))?;
    writer
        .into_inner()
        .map_err(|err| PipelineError::stage("compress.flush", stage, err.into_error()))?;
    Ok(total)
}
