//! Map-tree fixtures and polling helpers for pipeline tests.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use tokio::time::{Instant, sleep};

/// Create a prefixed scratch directory for a test.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn scratch() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("mapzipd-").tempdir()?)
}

/// Create a gameserver map tree and matching fastdownload destination under
/// `root`, mirroring the deployment shape (`<server>/maps` publishing into
/// `webdir/<server>`). Returns `(source_dir, dest_dir)`.
///
/// # Errors
///
/// Returns an error if the directories cannot be created.
pub fn rule_tree(root: &Path, server: &str) -> Result<(PathBuf, PathBuf)> {
    let source_dir = root.join(server).join("maps");
    let dest_dir = root.join("webdir").join(server);
    fs::create_dir_all(&source_dir)?;
    fs::create_dir_all(&dest_dir)?;
    Ok((source_dir, dest_dir))
}

/// Write a fake map file: a `VBSP` header followed by a repeating pattern up
/// to `len` bytes. Returns the written bytes for later assertions.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_map(path: &Path, len: usize) -> Result<Vec<u8>> {
    let mut contents = b"VBSP".to_vec();
    while contents.len() < len {
        let chunk = (contents.len() % 251) as u8;
        contents.push(chunk);
    }
    contents.truncate(len.max(4));
    fs::write(path, &contents)?;
    Ok(contents)
}

/// Poll `condition` until it returns true or `deadline` elapses.
pub async fn wait_until<F, Fut>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let poll = Duration::from_millis(10);
    let end = Instant::now() + deadline;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= end {
            return false;
        }
        sleep(poll).await;
    }
}

/// Blocking-predicate convenience wrapper around [`wait_until`].
pub async fn wait_until_sync(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    wait_until(deadline, || {
        let outcome = condition();
        async move { outcome }
    })
    .await
}
