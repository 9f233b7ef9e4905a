//! Embedded subtitle extraction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sf_av::probe;
use sf_av::StagedOutput;
use sf_core::Stage;

use crate::context::StageContext;
use crate::executor::StageExecutor;

/// Writes the preferred text subtitle stream of the source as SRT.
///
/// Sources without a convertible subtitle stream succeed with no output,
/// which sends the run down the speech-to-text fallback.
#[derive(Debug)]
pub struct SubtitleExtractor {
    tools: Arc<sf_av::ToolRegistry>,
}

impl SubtitleExtractor {
    pub fn new(tools: Arc<sf_av::ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl StageExecutor for SubtitleExtractor {
    fn stage(&self) -> Stage {
        Stage::ExtractSubtitles
    }

    fn name(&self) -> &'static str {
        "ffmpeg subtitle extraction"
    }

    async fn validate(&self) -> sf_core::Result<()> {
        self.tools.require("ffprobe")?;
        self.tools.require("ffmpeg")?;
        Ok(())
    }

    async fn execute(&self, ctx: &StageContext) -> sf_core::Result<Option<String>> {
        let input = Path::new(&ctx.request.input);
        let streams = probe::subtitle_streams(&self.tools, input).await?;
        let Some(stream) = probe::pick_text_stream(&streams) else {
            tracing::info!(
                fingerprint = %ctx.request.fingerprint,
                found = streams.len(),
                "No text subtitle stream"
            );
            return Ok(None);
        };

        let staged = StagedOutput::new(&ctx.output_path("srt"))?;
        sf_av::extract_subtitle(&self.tools, input, stream.index, &staged, &ctx.cancellation)
            .await?;
        let dest = staged.finalize()?;

        Ok(Some(dest.to_string_lossy().to_string()))
    }
}
