//! Run an operator-configured external command for a stage.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::staging::StagedOutput;

/// Substitute `{input}`, `{output}` and `{output_dir}` in `args`.
pub fn render_args(args: &[String], input: &str, staged: &StagedOutput) -> Vec<String> {
    let output_str = staged.path().to_string_lossy().to_string();
    let output_dir_str = staged.temp_dir().to_string_lossy().to_string();

    args.iter()
        .map(|a| {
            a.replace("{input}", input)
                .replace("{output_dir}", &output_dir_str)
                .replace("{output}", &output_str)
        })
        .collect()
}

/// Execute `program` with rendered `args`.
///
/// The command is expected to write either to `{output}` or to some file in
/// `{output_dir}`; the caller finalizes the staged output afterwards.
pub async fn exec_command(
    program: PathBuf,
    args: &[String],
    input: &str,
    staged: &StagedOutput,
    cancel: &CancellationToken,
) -> sf_core::Result<()> {
    let resolved_args = render_args(args, input, staged);

    tracing::info!("exec: {} {}", program.display(), resolved_args.join(" "));

    let mut cmd = ToolCommand::new(program);
    cmd.args(resolved_args);
    cmd.cancel_on(cancel.clone());
    cmd.execute().await?;

    Ok(())
}
