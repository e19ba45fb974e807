//! Job and version identity for the compression pipeline.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use uuid::Uuid;

/// Suffix appended to every published artifact.
const ARTIFACT_SUFFIX: &str = ".bz2";

/// Suffix of staged artifacts awaiting publication.
pub(crate) const STAGE_SUFFIX: &str = ".part";

/// Identity of a source file's content generation.
///
/// Two observations of the same path with equal length and modification time
/// are the same version and must not be re-enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileVersion {
    /// File length in bytes.
    pub len: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

impl FileVersion {
    /// Extract the version identity from file metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform does not expose a modification time.
    pub fn from_metadata(metadata: &Metadata) -> io::Result<Self> {
        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified()?,
        })
    }
}

/// Artifact name for a source path: the base name with `.bz2` appended.
///
/// Returns `None` when the path has no UTF-8 base name; such files cannot be
/// mirrored and are skipped by the watcher.
#[must_use]
pub fn artifact_name(source_path: &Path) -> Option<String> {
    source_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| format!("{name}{ARTIFACT_SUFFIX}"))
}

/// A single unit of compression work, created by a watcher and consumed
/// exactly once by a worker.
#[derive(Debug, Clone)]
pub struct CompressionJob {
    /// Correlation id shared by all events of this job.
    pub id: Uuid,
    /// Source map file to compress.
    pub source_path: PathBuf,
    /// Destination directory receiving the artifact.
    pub dest_dir: PathBuf,
    /// Source version this job was enqueued for.
    pub version: FileVersion,
    /// Base name of the published artifact.
    pub artifact_name: String,
}

impl CompressionJob {
    /// Build a job for a source file, deriving the artifact name.
    ///
    /// Returns `None` when the source base name is not valid UTF-8.
    #[must_use]
    pub fn for_source(
        source_path: PathBuf,
        dest_dir: PathBuf,
        version: FileVersion,
    ) -> Option<Self> {
        let artifact_name = artifact_name(&source_path)?;
        Some(Self {
            id: Uuid::new_v4(),
            source_path,
            dest_dir,
            version,
            artifact_name,
        })
    }

    /// Final artifact path under the destination directory.
    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.dest_dir.join(&self.artifact_name)
    }

    /// Staging path in the destination directory: hidden, suffixed with the
    /// job id so concurrent jobs can never collide, and on the same
    /// filesystem as the final name so the publish rename stays atomic.
    #[must_use]
    pub(crate) fn stage_path(&self) -> PathBuf {
        self.dest_dir
            .join(format!(".{}.{}{}", self.artifact_name, self.id, STAGE_SUFFIX))
    }
}
