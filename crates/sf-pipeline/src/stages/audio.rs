//! Audio-track extraction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sf_av::StagedOutput;
use sf_core::Stage;

use crate::context::StageContext;
use crate::executor::StageExecutor;

/// Extracts the first audio stream of the source with ffmpeg.
#[derive(Debug)]
pub struct AudioExtractor {
    format: String,
    tools: Arc<sf_av::ToolRegistry>,
}

impl AudioExtractor {
    /// `format` is the output extension (e.g. "mp3").
    pub fn new(format: impl Into<String>, tools: Arc<sf_av::ToolRegistry>) -> Self {
        Self {
            format: format.into(),
            tools,
        }
    }
}

#[async_trait]
impl StageExecutor for AudioExtractor {
    fn stage(&self) -> Stage {
        Stage::ExtractAudio
    }

    fn name(&self) -> &'static str {
        "ffmpeg audio extraction"
    }

    async fn validate(&self) -> sf_core::Result<()> {
        self.tools.require("ffmpeg").map(|_| ())
    }

    async fn execute(&self, ctx: &StageContext) -> sf_core::Result<Option<String>> {
        let input = Path::new(&ctx.request.input);
        let staged = StagedOutput::new(&ctx.output_path(&self.format))?;

        sf_av::extract_audio(&self.tools, input, &staged, &self.format, &ctx.cancellation).await?;
        let dest = staged.finalize()?;

        Ok(Some(dest.to_string_lossy().to_string()))
    }
}
