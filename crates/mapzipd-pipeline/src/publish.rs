//! Artifact publication: destination ownership and atomic rename.
//!
//! Ownership mutation is privileged on most platforms, so the "owning
//! user/group of the destination" lookup and the "apply ownership" step live
//! behind the narrow [`DestinationPolicy`] capability; the production
//! implementation uses chown/chmod, and test suites substitute a recording
//! fake.

use std::fs;
use std::path::{Path, PathBuf};

use crate::compress::discard_stage;
use crate::error::{PipelineError, PipelineResult};
use crate::job::CompressionJob;

#[cfg(unix)]
use std::os::unix::fs::{MetadataExt, PermissionsExt};

#[cfg(unix)]
use nix::unistd::{Gid, Uid, chown};

/// Ownership and permission attributes of a destination directory, applied to
/// every artifact published into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationAttrs {
    /// Owning user id of the destination directory.
    pub uid: u32,
    /// Owning group id of the destination directory.
    pub gid: u32,
    /// Permission bits for published files, derived from the directory mode.
    pub mode: u32,
}

/// Capability for reading a destination directory's ownership convention and
/// applying it to staged artifacts.
pub trait DestinationPolicy: Send + Sync {
    /// Read the owning user/group and file permission convention of
    /// `dest_dir` at this moment.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination directory cannot be inspected.
    fn probe(&self, dest_dir: &Path) -> PipelineResult<DestinationAttrs>;

    /// Apply `attrs` to a staged artifact before it becomes visible.
    ///
    /// # Errors
    ///
    /// Returns an error if ownership or permissions cannot be applied.
    fn apply(&self, path: &Path, attrs: &DestinationAttrs) -> PipelineResult<()>;
}

/// Production policy backed by chown/chmod.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixDestinationPolicy;

#[cfg(unix)]
impl DestinationPolicy for UnixDestinationPolicy {
    fn probe(&self, dest_dir: &Path) -> PipelineResult<DestinationAttrs> {
        let metadata = fs::metadata(dest_dir)
            .map_err(|err| PipelineError::io("publish.probe_dest", dest_dir, err))?;
        Ok(DestinationAttrs {
            uid: metadata.uid(),
            gid: metadata.gid(),
            mode: file_mode_from_dir(metadata.mode()),
        })
    }

    fn apply(&self, path: &Path, attrs: &DestinationAttrs) -> PipelineResult<()> {
        chown(
            path,
            Some(Uid::from_raw(attrs.uid)),
            Some(Gid::from_raw(attrs.gid)),
        )
        .map_err(|source| PipelineError::Ownership {
            path: path.to_path_buf(),
            source,
        })?;
        fs::set_permissions(path, fs::Permissions::from_mode(attrs.mode))
            .map_err(|err| PipelineError::io("publish.chmod", path, err))?;
        Ok(())
    }
}

#[cfg(not(unix))]
impl DestinationPolicy for UnixDestinationPolicy {
    fn probe(&self, _dest_dir: &Path) -> PipelineResult<DestinationAttrs> {
        Err(PipelineError::Unsupported {
            operation: "publish.probe_dest",
        })
    }

    fn apply(&self, _path: &Path, _attrs: &DestinationAttrs) -> PipelineResult<()> {
        Err(PipelineError::Unsupported {
            operation: "publish.apply",
        })
    }
}

/// Derive the permission bits for published files from the destination
/// directory mode: read/write bits are inherited, execute and special bits
/// are stripped.
#[cfg(any(unix, test))]
pub(crate) const fn file_mode_from_dir(dir_mode: u32) -> u32 {
    dir_mode & 0o666
}

/// Make a staged artifact visible under its final name.
///
/// The rename is the sole visibility transition: ownership and permissions
/// are applied while the artifact is still hidden, and any failure removes
/// the staged file so nothing wrongly-attributed or partial is ever
/// observable under the final name.
pub(crate) fn publish_artifact(
    policy: &dyn DestinationPolicy,
    job: &CompressionJob,
    staged: &Path,
) -> PipelineResult<PathBuf> {
    match try_publish(policy, job, staged) {
        Ok(artifact) => Ok(artifact),
        Err(err) => {
            discard_stage(staged);
            Err(err)
        }
    }
}

fn try_publish(
    policy: &dyn DestinationPolicy,
    job: &CompressionJob,
    staged: &Path,
) -> PipelineResult<PathBuf> {
    let artifact = job.artifact_path();
    let attrs = policy.probe(&job.dest_dir)?;
    policy.apply(staged, &attrs)?;
    fs::rename(staged, &artifact).map_err(|source| PipelineError::Rename {
        from: staged.to_path_buf(),
        to: artifact.clone(),
        source,
    })?;
    Ok(artifact)
}
