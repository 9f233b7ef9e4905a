//! Application configuration types.
//!
//! The top-level [`Config`] struct carries all sub-configs for the ledger,
//! storage layout, pipeline, inbox watcher and external tools. Every section
//! defaults sensibly so a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::stage::StagePlan;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub watch: WatchConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Reject configurations that break the orchestration contract.
    ///
    /// A live task must always have a deadline and there must be at least one
    /// worker, otherwise a dispatched stage could stay unresolved forever.
    pub fn check(&self) -> Result<()> {
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(Error::Validation(
                "pipeline.stage_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.pipeline.workers == 0 {
            return Err(Error::Validation(
                "pipeline.workers must be greater than 0".into(),
            ));
        }
        if self.pipeline.reconcile_interval_secs == 0 {
            return Err(Error::Validation(
                "pipeline.reconcile_interval_secs must be greater than 0".into(),
            ));
        }
        if self.ledger.pool_size == 0 {
            return Err(Error::Validation(
                "ledger.pool_size must be greater than 0".into(),
            ));
        }
        for (name, cmd) in [
            ("pipeline.vocal", &self.pipeline.vocal),
            ("pipeline.transcribe", &self.pipeline.transcribe),
        ] {
            if cmd.program.trim().is_empty() {
                return Err(Error::Validation(format!("{name}.program is empty")));
            }
        }
        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.reconcile_interval_secs > self.pipeline.stage_timeout_secs {
            warnings.push(
                "pipeline.reconcile_interval_secs exceeds stage_timeout_secs; \
                 timeouts will be detected late"
                    .into(),
            );
        }

        if self.watch.enabled && self.watch.paths.is_empty() {
            warnings.push("watch is enabled but no watch.paths are configured".into());
        }

        for (name, cmd) in [
            ("pipeline.vocal", &self.pipeline.vocal),
            ("pipeline.transcribe", &self.pipeline.transcribe),
        ] {
            if !cmd.args.iter().any(|a| a.contains("{input}")) {
                warnings.push(format!("{name}.args never reference {{input}}"));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// SQLite ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub db_path: PathBuf,
    pub pool_size: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/scribeforge.db"),
            pool_size: 4,
        }
    }
}

/// Root of the per-fingerprint artifact layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Stage ordering, worker pool and deadline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Try embedded subtitles before speech-to-text.
    pub prefer_embedded_subtitles: bool,
    /// Number of stages allowed to execute at once.
    pub workers: usize,
    /// Deadline for a live task before the reconciler fails it.
    pub stage_timeout_secs: u64,
    /// Cadence of the background reconciliation sweep.
    pub reconcile_interval_secs: u64,
    /// Container/extension for the extracted audio track.
    pub audio_format: String,
    /// Vocal isolation command template.
    pub vocal: CommandConfig,
    /// Transcription command template.
    pub transcribe: CommandConfig,
}

impl PipelineConfig {
    /// Plan assigned to fingerprints dispatched for the first time.
    pub fn plan(&self) -> StagePlan {
        if self.prefer_embedded_subtitles {
            StagePlan::SubtitlesFirst
        } else {
            StagePlan::SpeechToText
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prefer_embedded_subtitles: true,
            workers: 2,
            stage_timeout_secs: 3600,
            reconcile_interval_secs: 30,
            audio_format: "mp3".into(),
            vocal: CommandConfig::default_vocal(),
            transcribe: CommandConfig::default_transcribe(),
        }
    }
}

/// External command template.
///
/// `{input}`, `{output}` and `{output_dir}` in `args` are replaced with the
/// stage input reference, the artifact path and its directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// File extension of the artifact the command writes.
    #[serde(default = "default_output_ext")]
    pub output_ext: String,
}

fn default_output_ext() -> String {
    "txt".into()
}

impl CommandConfig {
    /// Voice-band filter through ffmpeg.
    pub fn default_vocal() -> Self {
        Self {
            program: "ffmpeg".into(),
            args: [
                "-y",
                "-i",
                "{input}",
                "-af",
                "highpass=f=200,lowpass=f=3000",
                "{output}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            output_ext: "mp3".into(),
        }
    }

    /// The `whisper` CLI writing `<stem>.txt` into the text directory.
    pub fn default_transcribe() -> Self {
        Self {
            program: "whisper".into(),
            args: [
                "{input}",
                "--model",
                "medium",
                "--output_format",
                "txt",
                "--output_dir",
                "{output_dir}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            output_ext: "txt".into(),
        }
    }
}

/// Inbox watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub paths: Vec<PathBuf>,
    pub settle_time_secs: u64,
    pub extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            paths: Vec::new(),
            settle_time_secs: 30,
            extensions: ["mp4", "mkv", "avi", "mov"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.ledger.db_path, PathBuf::from("./data/scribeforge.db"));
        assert_eq!(cfg.pipeline.workers, 2);
        assert_eq!(cfg.pipeline.stage_timeout_secs, 3600);
        assert_eq!(cfg.pipeline.plan(), StagePlan::SubtitlesFirst);
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn zero_timeout_is_fatal() {
        let mut cfg = Config::default();
        cfg.pipeline.stage_timeout_secs = 0;
        let err = cfg.check().unwrap_err().to_string();
        assert!(err.contains("stage_timeout_secs"), "got: {err}");
    }

    #[test]
    fn zero_workers_is_fatal() {
        let mut cfg = Config::default();
        cfg.pipeline.workers = 0;
        assert!(cfg.check().is_err());
    }

    #[test]
    fn empty_command_is_fatal() {
        let mut cfg = Config::default();
        cfg.pipeline.transcribe.program = "  ".into();
        let err = cfg.check().unwrap_err().to_string();
        assert!(err.contains("pipeline.transcribe"), "got: {err}");
    }

    #[test]
    fn watch_without_paths_warns() {
        let mut cfg = Config::default();
        cfg.watch.enabled = true;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("watch.paths")));
    }

    #[test]
    fn speech_to_text_plan_when_subtitles_disabled() {
        let cfg: Config =
            serde_json::from_str(r#"{"pipeline": {"prefer_embedded_subtitles": false}}"#)
                .unwrap();
        assert_eq!(cfg.pipeline.plan(), StagePlan::SpeechToText);
        assert_eq!(cfg.pipeline.workers, 2);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.pipeline.audio_format, "mp3");
        assert_eq!(cfg.watch.extensions, vec!["mp4", "mkv", "avi", "mov"]);
    }

    #[test]
    fn command_output_ext_defaults() {
        let cfg: CommandConfig =
            serde_json::from_str(r#"{"program": "demucs", "args": ["{input}"]}"#).unwrap();
        assert_eq!(cfg.output_ext, "txt");
    }
}
