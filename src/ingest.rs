//! Source acquisition: fingerprint a file and store it under the data root.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use sf_core::paths::StoragePaths;
use sf_core::{Error, Fingerprint, Result};

/// A source file that has been fingerprinted and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub fingerprint: Fingerprint,
    /// Path of the stored copy, used as the stage-one input.
    pub source_ref: String,
    /// False when identical content was already stored.
    pub copied: bool,
}

/// Hash `path` with SHA-256 and copy it to
/// `<data>/<fp>/source/<fp>.<ext>` unless that content is already stored.
///
/// The copy is written next to its destination and renamed into place, so a
/// stored source is always complete.
pub fn ingest_file(path: &Path, paths: &StoragePaths) -> Result<Ingested> {
    if !path.is_file() {
        return Err(Error::Validation(format!(
            "source is not a file: {}",
            path.display()
        )));
    }

    let fingerprint = Fingerprint::of_reader(BufReader::new(File::open(path)?))?;

    if let Some(existing) = paths.find_source(&fingerprint) {
        tracing::debug!(fingerprint = %fingerprint, path = %existing.display(), "Source already stored");
        return Ok(Ingested {
            fingerprint,
            source_ref: existing.to_string_lossy().to_string(),
            copied: false,
        });
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    let dest = paths.source_file(&fingerprint, &ext);
    paths.ensure_layout(&fingerprint)?;
    copy_atomic(path, &dest)?;

    tracing::info!(
        fingerprint = %fingerprint,
        from = %path.display(),
        to = %dest.display(),
        "Ingested source"
    );
    Ok(Ingested {
        fingerprint,
        source_ref: dest.to_string_lossy().to_string(),
        copied: true,
    })
}

fn copy_atomic(from: &Path, dest: &Path) -> Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| Error::Internal(format!("no parent directory for {}", dest.display())))?;
    // Unique hidden name per call; never mistaken for a stored source.
    let mut partial = tempfile::Builder::new()
        .prefix(".ingest-")
        .suffix(".partial")
        .tempfile_in(dir)?;
    std::io::copy(&mut File::open(from)?, partial.as_file_mut())?;
    partial.as_file().sync_all()?;
    partial.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
