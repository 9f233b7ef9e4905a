//! Operator-configured command stages (vocal isolation, transcription).

use std::sync::Arc;

use async_trait::async_trait;
use sf_av::StagedOutput;
use sf_core::config::CommandConfig;
use sf_core::Stage;

use crate::context::StageContext;
use crate::executor::StageExecutor;

/// Runs an external command template for one stage.
///
/// The command writes to `{output}` or drops a single file with the
/// configured extension into `{output_dir}`; either is moved into the
/// stage directory once the command exits successfully.
#[derive(Debug)]
pub struct CommandStage {
    stage: Stage,
    command: CommandConfig,
    tools: Arc<sf_av::ToolRegistry>,
}

impl CommandStage {
    pub fn new(stage: Stage, command: CommandConfig, tools: Arc<sf_av::ToolRegistry>) -> Self {
        Self {
            stage,
            command,
            tools,
        }
    }
}

#[async_trait]
impl StageExecutor for CommandStage {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn name(&self) -> &'static str {
        match self.stage {
            Stage::IsolateVocal => "vocal isolation command",
            Stage::Transcribe => "transcription command",
            _ => "external command",
        }
    }

    async fn validate(&self) -> sf_core::Result<()> {
        self.tools.require(&self.command.program).map(|_| ())
    }

    async fn execute(&self, ctx: &StageContext) -> sf_core::Result<Option<String>> {
        let staged = StagedOutput::new(&ctx.output_path(&self.command.output_ext))?;

        sf_av::exec_command(
            self.tools.path_or_name(&self.command.program),
            &self.command.args,
            &ctx.request.input,
            &staged,
            &ctx.cancellation,
        )
        .await?;

        let dest = if staged.path().exists() {
            staged.finalize()?
        } else {
            let produced = staged.find_produced(&self.command.output_ext).ok_or_else(|| {
                sf_core::Error::stage(
                    self.stage,
                    format!(
                        "{} produced no .{} output",
                        self.command.program, self.command.output_ext
                    ),
                )
            })?;
            staged.finalize_file(&produced)?
        };

        Ok(Some(dest.to_string_lossy().to_string()))
    }
}
