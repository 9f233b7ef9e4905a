//! On-disk layout of per-fingerprint artifacts.
//!
//! ```text
//! <data_dir>/<fingerprint>/source/<fingerprint>.<ext>
//! <data_dir>/<fingerprint>/subtitle/<fingerprint>.srt
//! <data_dir>/<fingerprint>/track/<fingerprint>.<audio_format>
//! <data_dir>/<fingerprint>/vocal/<fingerprint>.<ext>
//! <data_dir>/<fingerprint>/text/<fingerprint>.txt
//! ```

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ids::Fingerprint;
use crate::stage::Stage;

/// Directory name holding ingested source files.
pub const SOURCE_DIR: &str = "source";

/// Resolves artifact locations under a data root.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<fingerprint>`
    pub fn fingerprint_dir(&self, fp: &Fingerprint) -> PathBuf {
        self.root.join(fp.as_str())
    }

    /// `<root>/<fingerprint>/source`
    pub fn source_dir(&self, fp: &Fingerprint) -> PathBuf {
        self.fingerprint_dir(fp).join(SOURCE_DIR)
    }

    /// Where an ingested source with extension `ext` is stored.
    pub fn source_file(&self, fp: &Fingerprint, ext: &str) -> PathBuf {
        self.source_dir(fp).join(file_name(fp, ext))
    }

    /// Directory owned by `stage` for this fingerprint.
    pub fn stage_dir(&self, fp: &Fingerprint, stage: Stage) -> PathBuf {
        self.fingerprint_dir(fp).join(stage.dir_name())
    }

    /// Artifact path for `stage` with extension `ext`.
    pub fn stage_output(&self, fp: &Fingerprint, stage: Stage, ext: &str) -> PathBuf {
        self.stage_dir(fp, stage).join(file_name(fp, ext))
    }

    /// Find an already-ingested source file, whatever its extension.
    pub fn find_source(&self, fp: &Fingerprint) -> Option<PathBuf> {
        let entries = std::fs::read_dir(self.source_dir(fp)).ok()?;
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.is_file() && p.file_stem().is_some_and(|s| s == fp.as_str()))
    }

    /// Create the source and every stage directory for `fp`.
    pub fn ensure_layout(&self, fp: &Fingerprint) -> Result<()> {
        std::fs::create_dir_all(self.source_dir(fp))?;
        for stage in Stage::ALL {
            std::fs::create_dir_all(self.stage_dir(fp, stage))?;
        }
        Ok(())
    }
}

fn file_name(fp: &Fingerprint, ext: &str) -> String {
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        fp.as_str().to_string()
    } else {
        format!("{}.{}", fp.as_str(), ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::parse("abc123").unwrap()
    }

    #[test]
    fn layout_is_keyed_by_fingerprint() {
        let paths = StoragePaths::new("/data");
        assert_eq!(
            paths.source_file(&fp(), "mkv"),
            PathBuf::from("/data/abc123/source/abc123.mkv")
        );
        assert_eq!(
            paths.stage_output(&fp(), Stage::ExtractAudio, ".mp3"),
            PathBuf::from("/data/abc123/track/abc123.mp3")
        );
        assert_eq!(
            paths.stage_output(&fp(), Stage::Transcribe, "txt"),
            PathBuf::from("/data/abc123/text/abc123.txt")
        );
        assert_eq!(
            paths.stage_dir(&fp(), Stage::ExtractSubtitles),
            PathBuf::from("/data/abc123/subtitle")
        );
    }

    #[test]
    fn ensure_layout_and_find_source() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StoragePaths::new(tmp.path());
        paths.ensure_layout(&fp()).unwrap();
        for stage in Stage::ALL {
            assert!(paths.stage_dir(&fp(), stage).is_dir());
        }
        assert!(paths.find_source(&fp()).is_none());

        let src = paths.source_file(&fp(), "mov");
        std::fs::write(&src, b"movie").unwrap();
        assert_eq!(paths.find_source(&fp()), Some(src));
    }

    #[test]
    fn extensionless_file_name() {
        let paths = StoragePaths::new("/d");
        assert_eq!(
            paths.source_file(&fp(), ""),
            PathBuf::from("/d/abc123/source/abc123")
        );
    }
}
