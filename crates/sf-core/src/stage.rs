//! Pipeline-domain enums: stages, plans, lifecycle statuses, task outcomes,
//! and the transient [`StageResult`] reported by executors.
//!
//! All enums serialize in snake_case and implement `Display`/`FromStr` with
//! the same spelling that is stored in the ledger tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One step of the processing chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Pull an embedded subtitle track out of the source as a transcript.
    ExtractSubtitles,
    /// Extract the audio track from the source.
    ExtractAudio,
    /// Isolate the vocal stem from the extracted audio track.
    IsolateVocal,
    /// Transcribe the vocal stem to text.
    Transcribe,
}

impl Stage {
    /// Every stage, in declaration order.
    pub const ALL: [Stage; 4] = [
        Stage::ExtractSubtitles,
        Stage::ExtractAudio,
        Stage::IsolateVocal,
        Stage::Transcribe,
    ];

    /// Ledger spelling of the stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractSubtitles => "extract_subtitles",
            Self::ExtractAudio => "extract_audio",
            Self::IsolateVocal => "isolate_vocal",
            Self::Transcribe => "transcribe",
        }
    }

    /// Directory name under `data/<fingerprint>/` holding this stage's output.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::ExtractSubtitles => "subtitle",
            Self::ExtractAudio => "track",
            Self::IsolateVocal => "vocal",
            Self::Transcribe => "text",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown stage '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// StagePlan
// ---------------------------------------------------------------------------

/// Stage-order policy chosen once per fingerprint at first dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePlan {
    /// Try embedded subtitles first, falling back to speech-to-text when the
    /// source has none. Audio is extracted either way.
    SubtitlesFirst,
    /// Go straight to audio extraction, vocal isolation and transcription.
    SpeechToText,
}

impl StagePlan {
    /// The stage every run of this plan starts with.
    pub fn first_stage(&self) -> Stage {
        match self {
            Self::SubtitlesFirst => Stage::ExtractSubtitles,
            Self::SpeechToText => Stage::ExtractAudio,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubtitlesFirst => "subtitles_first",
            Self::SpeechToText => "speech_to_text",
        }
    }
}

impl fmt::Display for StagePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StagePlan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "subtitles_first" => Ok(Self::SubtitlesFirst),
            "speech_to_text" => Ok(Self::SpeechToText),
            other => Err(Error::Validation(format!("unknown stage plan '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// FileStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a file record. A missing record means "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether no further stage will run without a new request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation(format!("unknown file status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskOutcome
// ---------------------------------------------------------------------------

/// How a resolved task ended. Live tasks have no outcome yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The executor reported success.
    Succeeded,
    /// The executor reported failure.
    Failed,
    /// No completion arrived before the deadline.
    TimedOut,
    /// The task was superseded during crash recovery and re-dispatched.
    Abandoned,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "timed_out" => Ok(Self::TimedOut),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(Error::Validation(format!("unknown task outcome '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// Transient value returned by a stage executor.
///
/// `output` is a reference to the persisted artifact (usually a path). A
/// successful result without output means the stage found nothing to produce,
/// which only the subtitle stage uses to request the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl StageResult {
    /// Successful result with an output reference.
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    /// Successful result that produced nothing.
    pub fn empty() -> Self {
        Self {
            success: true,
            output: None,
            error: None,
        }
    }

    /// Failed result with a human-readable reason.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Failure reason, defaulting to a generic message when the executor did
    /// not supply one.
    pub fn reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "stage failed without a reason".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!("vocals".parse::<Stage>().is_err());
    }

    #[test]
    fn stage_serializes_like_ledger() {
        let json = serde_json::to_string(&Stage::IsolateVocal).unwrap();
        assert_eq!(json, "\"isolate_vocal\"");
    }

    #[test]
    fn plan_first_stage() {
        assert_eq!(StagePlan::SubtitlesFirst.first_stage(), Stage::ExtractSubtitles);
        assert_eq!(StagePlan::SpeechToText.first_stage(), Stage::ExtractAudio);
        assert_eq!(
            "speech_to_text".parse::<StagePlan>().unwrap(),
            StagePlan::SpeechToText
        );
    }

    #[test]
    fn file_status_terminality() {
        assert!(!FileStatus::InProgress.is_terminal());
        assert!(FileStatus::Succeeded.is_terminal());
        assert!(FileStatus::Failed.is_terminal());
        assert_eq!("failed".parse::<FileStatus>().unwrap(), FileStatus::Failed);
        assert!("progress".parse::<FileStatus>().is_err());
    }

    #[test]
    fn task_outcome_parse() {
        assert_eq!("timed_out".parse::<TaskOutcome>().unwrap(), TaskOutcome::TimedOut);
        assert!("done".parse::<TaskOutcome>().is_err());
    }

    #[test]
    fn stage_result_constructors() {
        let ok = StageResult::succeeded("abc123/track.out");
        assert!(ok.success);
        assert_eq!(ok.output.as_deref(), Some("abc123/track.out"));

        let none = StageResult::empty();
        assert!(none.success && none.output.is_none());

        let bad = StageResult::failed("codec error");
        assert!(!bad.success);
        assert_eq!(bad.reason(), "codec error");
        assert_eq!(
            StageResult { success: false, output: None, error: None }.reason(),
            "stage failed without a reason"
        );
    }
}
