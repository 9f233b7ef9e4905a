//! Stage-order policy.
//!
//! The plan is fixed per fingerprint at first dispatch. Only this module
//! knows the order of stages and the subtitle fallback rule.

use sf_core::{Stage, StagePlan};

/// The stage that follows `completed`, or `None` when the run is finished.
///
/// `subtitle_transcript` says whether the subtitle stage of this run
/// produced a transcript. Under [`StagePlan::SubtitlesFirst`] audio is always
/// extracted, but vocal isolation and transcription only run as a fallback
/// when there is no subtitle transcript.
pub fn next_stage(plan: StagePlan, completed: Stage, subtitle_transcript: bool) -> Option<Stage> {
    match (completed, plan) {
        (Stage::ExtractSubtitles, _) => Some(Stage::ExtractAudio),
        (Stage::ExtractAudio, StagePlan::SubtitlesFirst) if subtitle_transcript => None,
        (Stage::ExtractAudio, _) => Some(Stage::IsolateVocal),
        (Stage::IsolateVocal, _) => Some(Stage::Transcribe),
        (Stage::Transcribe, _) => None,
    }
}

/// The stage whose output feeds `stage`; `None` means it reads the source.
pub fn input_stage(stage: Stage) -> Option<Stage> {
    match stage {
        Stage::ExtractSubtitles | Stage::ExtractAudio => None,
        Stage::IsolateVocal => Some(Stage::ExtractAudio),
        Stage::Transcribe => Some(Stage::IsolateVocal),
    }
}

/// Every stage a full run of `plan` visits, in order.
pub fn stages(plan: StagePlan, subtitle_transcript: bool) -> Vec<Stage> {
    let mut out = vec![plan.first_stage()];
    while let Some(next) = out
        .last()
        .and_then(|&s| next_stage(plan, s, subtitle_transcript))
    {
        out.push(next);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speech_to_text_chain() {
        assert_eq!(
            stages(StagePlan::SpeechToText, false),
            vec![Stage::ExtractAudio, Stage::IsolateVocal, Stage::Transcribe]
        );
        // The subtitle flag is irrelevant without a subtitle stage.
        assert_eq!(
            next_stage(StagePlan::SpeechToText, Stage::ExtractAudio, true),
            Some(Stage::IsolateVocal)
        );
    }

    #[test]
    fn subtitles_short_circuit_but_keep_audio() {
        assert_eq!(
            stages(StagePlan::SubtitlesFirst, true),
            vec![Stage::ExtractSubtitles, Stage::ExtractAudio]
        );
    }

    #[test]
    fn subtitles_missing_falls_back() {
        assert_eq!(
            stages(StagePlan::SubtitlesFirst, false),
            vec![
                Stage::ExtractSubtitles,
                Stage::ExtractAudio,
                Stage::IsolateVocal,
                Stage::Transcribe
            ]
        );
    }

    #[test]
    fn inputs_chain_previous_outputs() {
        assert_eq!(input_stage(Stage::ExtractSubtitles), None);
        assert_eq!(input_stage(Stage::ExtractAudio), None);
        assert_eq!(input_stage(Stage::IsolateVocal), Some(Stage::ExtractAudio));
        assert_eq!(input_stage(Stage::Transcribe), Some(Stage::IsolateVocal));
    }
}
