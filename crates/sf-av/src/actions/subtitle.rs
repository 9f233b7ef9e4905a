//! Write one embedded subtitle stream out as SRT via ffmpeg.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::staging::StagedOutput;
use crate::tools::ToolRegistry;

/// Convert subtitle stream `stream_index` of `input` to SRT in `staged`.
pub async fn extract_subtitle(
    tools: &ToolRegistry,
    input: &Path,
    stream_index: u32,
    staged: &StagedOutput,
    cancel: &CancellationToken,
) -> sf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;
    let output = staged.path();

    tracing::info!("extract subtitle stream {stream_index} from {:?}", input);

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(["-y", "-nostdin", "-i"]);
    cmd.arg(input.to_string_lossy().as_ref());
    cmd.args(["-map", &format!("0:{stream_index}"), "-c:s", "srt"]);
    cmd.arg(output.to_string_lossy().as_ref());
    cmd.cancel_on(cancel.clone());
    cmd.execute().await?;

    Ok(())
}
