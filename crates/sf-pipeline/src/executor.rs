//! The stage executor interface.
//!
//! A [`StageExecutor`] performs one kind of stage. The orchestrator never
//! talks to executors directly: it dispatches a [`StageRequest`] and a worker
//! resolves the executor for that stage through [`ExecutorSet::for_stage`],
//! then reports the [`StageResult`] produced by [`run_stage`].
//!
//! [`StageRequest`]: crate::context::StageRequest

use std::sync::Arc;

use async_trait::async_trait;
use sf_core::{Stage, StageResult};

use crate::context::StageContext;

/// Performs one pipeline stage.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// The stage this executor implements.
    fn stage(&self) -> Stage;

    /// A short, human-readable name (e.g. "ffmpeg audio extraction").
    fn name(&self) -> &'static str;

    /// Check preconditions such as tool availability.
    ///
    /// Called once at startup so missing tools are reported before any task
    /// is dispatched.
    async fn validate(&self) -> sf_core::Result<()> {
        Ok(())
    }

    /// Run the stage and return the persisted output reference.
    ///
    /// `Ok(None)` means the stage succeeded without producing anything. The
    /// artifact must be in its final location before this returns.
    async fn execute(&self, ctx: &StageContext) -> sf_core::Result<Option<String>>;
}

/// One executor per stage.
#[derive(Clone)]
pub struct ExecutorSet {
    subtitles: Arc<dyn StageExecutor>,
    audio: Arc<dyn StageExecutor>,
    vocal: Arc<dyn StageExecutor>,
    transcribe: Arc<dyn StageExecutor>,
}

impl ExecutorSet {
    /// Assemble a set, checking that each executor sits in the right slot.
    pub fn new(
        subtitles: Arc<dyn StageExecutor>,
        audio: Arc<dyn StageExecutor>,
        vocal: Arc<dyn StageExecutor>,
        transcribe: Arc<dyn StageExecutor>,
    ) -> sf_core::Result<Self> {
        let set = Self {
            subtitles,
            audio,
            vocal,
            transcribe,
        };
        for stage in Stage::ALL {
            let actual = set.for_stage(stage).stage();
            if actual != stage {
                return Err(sf_core::Error::Validation(format!(
                    "executor for {actual} registered in the {stage} slot"
                )));
            }
        }
        Ok(set)
    }

    /// The executor responsible for `stage`.
    pub fn for_stage(&self, stage: Stage) -> &Arc<dyn StageExecutor> {
        match stage {
            Stage::ExtractSubtitles => &self.subtitles,
            Stage::ExtractAudio => &self.audio,
            Stage::IsolateVocal => &self.vocal,
            Stage::Transcribe => &self.transcribe,
        }
    }

    /// Validate every executor, collecting all failures.
    pub async fn validate_all(&self) -> Vec<(Stage, sf_core::Error)> {
        let mut failures = Vec::new();
        for stage in Stage::ALL {
            if let Err(e) = self.for_stage(stage).validate().await {
                failures.push((stage, e));
            }
        }
        failures
    }
}

impl std::fmt::Debug for ExecutorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorSet")
            .field("subtitles", &self.subtitles.name())
            .field("audio", &self.audio.name())
            .field("vocal", &self.vocal.name())
            .field("transcribe", &self.transcribe.name())
            .finish()
    }
}

/// Run the executor for `ctx.request.stage` and fold the outcome into a
/// [`StageResult`]. Never fails: executor errors become failed results.
pub async fn run_stage(set: &ExecutorSet, ctx: &StageContext) -> StageResult {
    let req = &ctx.request;
    let executor = set.for_stage(req.stage);

    if ctx.cancellation.is_cancelled() {
        return StageResult::failed("cancelled before start");
    }

    tracing::info!(
        fingerprint = %req.fingerprint,
        task = %req.task,
        stage = %req.stage,
        executor = executor.name(),
        "Starting stage"
    );
    let started = std::time::Instant::now();

    match executor.execute(ctx).await {
        Ok(Some(output)) => {
            tracing::info!(
                fingerprint = %req.fingerprint,
                stage = %req.stage,
                output = %output,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stage produced output"
            );
            StageResult::succeeded(output)
        }
        Ok(None) => {
            tracing::info!(
                fingerprint = %req.fingerprint,
                stage = %req.stage,
                "Stage produced nothing"
            );
            StageResult::empty()
        }
        Err(e) => {
            tracing::warn!(
                fingerprint = %req.fingerprint,
                stage = %req.stage,
                error = %e,
                "Stage failed"
            );
            StageResult::failed(e.to_string())
        }
    }
}
