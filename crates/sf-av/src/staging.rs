//! Atomic output finalization for stage artifacts.
//!
//! A [`StagedOutput`] provides a scratch directory next to the final artifact
//! location. Tools write into the scratch directory and the finished file is
//! renamed into place, so a crash never leaves a half-written artifact at the
//! path the ledger points to.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch space for producing one artifact.
///
/// # Example
///
/// ```no_run
/// use sf_av::StagedOutput;
///
/// let staged = StagedOutput::new(std::path::Path::new("/data/abc/track/abc.mp3")).unwrap();
/// // ... run a tool that writes to staged.path() ...
/// let final_path = staged.finalize().unwrap();
/// ```
pub struct StagedOutput {
    temp_dir: TempDir,
    dest: PathBuf,
}

impl StagedOutput {
    /// Create scratch space for an artifact that will end up at `dest`.
    ///
    /// The destination directory is created if needed and the scratch
    /// directory lives inside it so the final rename stays on one filesystem.
    pub fn new(dest: &Path) -> sf_core::Result<Self> {
        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let temp_dir = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(parent)
            .map_err(|e| sf_core::Error::tool("staging", format!("failed to create temp dir: {e}")))?;

        Ok(Self {
            temp_dir,
            dest: dest.to_path_buf(),
        })
    }

    /// Final artifact location.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Where the tool should write (same file name as `dest`, inside the
    /// scratch directory).
    pub fn path(&self) -> PathBuf {
        let file_name = self
            .dest
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("output"));
        self.temp_dir.path().join(file_name)
    }

    /// Path to the scratch directory, for tools that pick their own output
    /// file names.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Move [`path`](Self::path) into place and return the final location.
    ///
    /// # Errors
    ///
    /// Returns an error if the output file does not exist or is empty, or if
    /// moving it fails.
    pub fn finalize(self) -> sf_core::Result<PathBuf> {
        let produced = self.path();
        self.finalize_file(&produced)
    }

    /// Move an arbitrary file from the scratch directory into place.
    pub fn finalize_file(self, produced: &Path) -> sf_core::Result<PathBuf> {
        let meta = std::fs::metadata(produced).map_err(|_| {
            sf_core::Error::tool(
                "staging",
                format!("output file does not exist: {}", produced.display()),
            )
        })?;
        if meta.len() == 0 {
            return Err(sf_core::Error::tool(
                "staging",
                format!("output file is empty: {}", produced.display()),
            ));
        }

        // Try rename first (same filesystem), fall back to copy+remove.
        if std::fs::rename(produced, &self.dest).is_err() {
            std::fs::copy(produced, &self.dest).map_err(|e| {
                sf_core::Error::tool("staging", format!("failed to copy output to destination: {e}"))
            })?;
            let _ = std::fs::remove_file(produced);
        }

        Ok(self.dest)
    }

    /// Find the single file with extension `ext` a tool left in the scratch
    /// directory.
    pub fn find_produced(&self, ext: &str) -> Option<PathBuf> {
        let ext = ext.trim_start_matches('.');
        std::fs::read_dir(self.temp_dir.path())
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.is_file() && p.extension().is_some_and(|e| e == ext))
    }
}
