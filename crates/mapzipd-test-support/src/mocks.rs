//! Fake destination policies for exercising the publisher unprivileged.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mapzipd_pipeline::{DestinationAttrs, DestinationPolicy, PipelineResult};

/// A destination policy that answers every probe with fixed attributes and
/// records each apply call instead of mutating real ownership.
pub struct RecordingPolicy {
    attrs: DestinationAttrs,
    applied: Mutex<Vec<(PathBuf, DestinationAttrs)>>,
}

impl RecordingPolicy {
    /// Construct a policy that reports `uid`/`gid` with mode `0o644`.
    #[must_use]
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            attrs: DestinationAttrs {
                uid,
                gid,
                mode: 0o644,
            },
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Paths and attributes the publisher applied so far.
    ///
    /// # Panics
    ///
    /// Panics if the recording mutex has been poisoned.
    #[must_use]
    pub fn applied(&self) -> Vec<(PathBuf, DestinationAttrs)> {
        self.applied.lock().expect("recording mutex poisoned").clone()
    }
}

impl DestinationPolicy for RecordingPolicy {
    fn probe(&self, _dest_dir: &Path) -> PipelineResult<DestinationAttrs> {
        Ok(self.attrs)
    }

    fn apply(&self, path: &Path, attrs: &DestinationAttrs) -> PipelineResult<()> {
        self.applied
            .lock()
            .expect("recording mutex poisoned")
            .push((path.to_path_buf(), *attrs));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_policy_replays_applied_calls() -> PipelineResult<()> {
        let policy = RecordingPolicy::new(1000, 1000);
        let attrs = policy.probe(Path::new("/var/www/fastdownload/maps"))?;
        policy.apply(Path::new("/var/www/fastdownload/maps/.m.part"), &attrs)?;

        let applied = policy.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].1.uid, 1000);
        Ok(())
    }
}
