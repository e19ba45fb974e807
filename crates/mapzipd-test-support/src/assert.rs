//! Artifact assertions shared by pipeline test suites.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use bzip2::read::BzDecoder;

/// Decode a published bzip2 artifact to its original bytes.
///
/// # Errors
///
/// Returns an error if the artifact cannot be opened or is not a complete
/// bzip2 stream.
pub fn decode_artifact(artifact: &Path) -> Result<Vec<u8>> {
    let file = File::open(artifact)
        .with_context(|| format!("opening artifact {}", artifact.display()))?;
    let mut decoded = Vec::new();
    BzDecoder::new(file)
        .read_to_end(&mut decoded)
        .with_context(|| format!("decoding artifact {}", artifact.display()))?;
    Ok(decoded)
}

/// Assert that an artifact is a complete bzip2 stream decoding to `expected`.
///
/// # Errors
///
/// Returns an error if decoding fails or the payload differs.
pub fn assert_artifact_matches(artifact: &Path, expected: &[u8]) -> Result<()> {
    let decoded = decode_artifact(artifact)?;
    ensure!(
        decoded == expected,
        "artifact {} decoded to {} bytes, expected {}",
        artifact.display(),
        decoded.len(),
        expected.len()
    );
    Ok(())
}
