//! Extract the primary audio track via ffmpeg.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::staging::StagedOutput;
use crate::tools::ToolRegistry;

/// Extract the first audio stream of `input` into `staged`.
///
/// `format` is the output extension; the codec is chosen from it.
pub async fn extract_audio(
    tools: &ToolRegistry,
    input: &Path,
    staged: &StagedOutput,
    format: &str,
    cancel: &CancellationToken,
) -> sf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;
    let output = staged.path();

    tracing::info!("extract audio ({format}) from {:?}", input);

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(ffmpeg_args(input, &output, format));
    cmd.cancel_on(cancel.clone());
    cmd.execute().await?;

    Ok(())
}

fn ffmpeg_args(input: &Path, output: &Path, format: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-nostdin", "-i"].map(String::from).to_vec();
    args.push(input.to_string_lossy().into_owned());
    args.extend(["-vn", "-sn", "-map", "0:a:0"].map(String::from));
    args.extend(codec_args(format).iter().copied().map(String::from));
    args.push(output.to_string_lossy().into_owned());
    args
}

fn codec_args(format: &str) -> &'static [&'static str] {
    match format {
        "mp3" => &["-c:a", "libmp3lame", "-q:a", "2"],
        "wav" => &["-c:a", "pcm_s16le", "-ar", "16000", "-ac", "1"],
        "flac" => &["-c:a", "flac"],
        "m4a" | "aac" => &["-c:a", "aac", "-b:a", "192k"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_args_by_format() {
        assert_eq!(codec_args("mp3")[1], "libmp3lame");
        assert_eq!(codec_args("wav")[1], "pcm_s16le");
        assert!(codec_args("ogg").is_empty());
    }

    #[test]
    fn ffmpeg_args_place_codec_before_output() {
        let args = ffmpeg_args(Path::new("/in/a.mkv"), Path::new("/out/a.wav"), "wav");
        assert_eq!(&args[..4], ["-y", "-nostdin", "-i", "/in/a.mkv"]);
        assert_eq!(&args[8..10], ["-c:a", "pcm_s16le"]);
        assert_eq!(args.last().map(String::as_str), Some("/out/a.wav"));

        let plain = ffmpeg_args(Path::new("/in/a.mkv"), Path::new("/out/a.ogg"), "ogg");
        assert_eq!(plain.len(), 9);
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedOutput::new(&dir.path().join("a.mp3")).unwrap();
        let err = extract_audio(
            &ToolRegistry::default(),
            Path::new("/in.mkv"),
            &staged,
            "mp3",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("ffmpeg not found"));
    }
}
