//! Stream inspection through `ffprobe`.
//!
//! Only what the subtitle stage needs: the list of subtitle streams and
//! whether ffmpeg can convert them to text.

use std::path::Path;

use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Bitmap subtitle codecs that cannot be converted to SRT without OCR.
const BITMAP_SUBTITLE_CODECS: &[&str] = &["hdmv_pgs_subtitle", "dvd_subtitle", "dvb_subtitle", "xsub"];

/// One subtitle stream in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleStream {
    /// Stream index within the container.
    pub index: u32,
    pub codec: String,
    pub language: Option<String>,
    pub default: bool,
}

impl SubtitleStream {
    /// Whether ffmpeg can write this stream out as text.
    pub fn is_text(&self) -> bool {
        !BITMAP_SUBTITLE_CODECS.contains(&self.codec.as_str())
    }
}

/// List subtitle streams in `input`.
pub async fn subtitle_streams(
    tools: &ToolRegistry,
    input: &Path,
) -> sf_core::Result<Vec<SubtitleStream>> {
    let ffprobe = tools.require("ffprobe")?;

    let mut cmd = ToolCommand::new(ffprobe.path.clone());
    cmd.args([
        "-v", "quiet",
        "-print_format", "json",
        "-show_streams",
        "-select_streams", "s",
    ]);
    cmd.arg(input.to_string_lossy().as_ref());

    let output = cmd.execute().await?;
    parse_subtitle_streams(&output.stdout)
}

/// Pick the stream to extract: the default text stream, otherwise the first
/// text stream.
pub fn pick_text_stream(streams: &[SubtitleStream]) -> Option<&SubtitleStream> {
    streams
        .iter()
        .filter(|s| s.is_text())
        .find(|s| s.default)
        .or_else(|| streams.iter().find(|s| s.is_text()))
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    default: u8,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
}

fn parse_subtitle_streams(json: &str) -> sf_core::Result<Vec<SubtitleStream>> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| sf_core::Error::tool("ffprobe", format!("JSON parse error: {e}")))?;

    Ok(ff
        .streams
        .into_iter()
        .filter(|s| s.codec_type.as_deref() == Some("subtitle"))
        .map(|s| SubtitleStream {
            index: s.index,
            codec: s.codec_name.unwrap_or_default(),
            language: s.tags.language,
            default: s.disposition.default == 1,
        })
        .collect())
}
