//! Executor factory: build the [`ExecutorSet`] described by configuration.

use std::sync::Arc;

use sf_core::config::PipelineConfig;
use sf_core::Stage;

use crate::executor::ExecutorSet;
use crate::stages::{AudioExtractor, CommandStage, SubtitleExtractor};

/// Create the production executors for every stage.
///
/// Tool availability is not checked here; call
/// [`ExecutorSet::validate_all`] to report missing tools before work starts.
///
/// # Errors
///
/// Returns [`sf_core::Error::Validation`] if an executor ends up in the
/// wrong slot.
pub fn build_executors(
    config: &PipelineConfig,
    tools: Arc<sf_av::ToolRegistry>,
) -> sf_core::Result<ExecutorSet> {
    ExecutorSet::new(
        Arc::new(SubtitleExtractor::new(tools.clone())),
        Arc::new(AudioExtractor::new(config.audio_format.clone(), tools.clone())),
        Arc::new(CommandStage::new(
            Stage::IsolateVocal,
            config.vocal.clone(),
            tools.clone(),
        )),
        Arc::new(CommandStage::new(
            Stage::Transcribe,
            config.transcribe.clone(),
            tools,
        )),
    )
}
