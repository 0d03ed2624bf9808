//! FFprobe-based video metadata extraction.

use crate::error::AppError;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

/// Raw probe result. Fields are 0 when ffprobe did not report them; validation is the
/// caller's job.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeMetadata {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec_name: Option<String>,
    pub format_name: Option<String>,
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|d| d.is_finite())
}

/// Parse ffprobe JSON output. Duration comes from the container, falling back to the video stream.
pub fn parse_ffprobe_json(json: &str) -> Result<ProbeMetadata, AppError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| AppError::probe(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let video_stream = output
        .streams
        .as_ref()
        .and_then(|streams| streams.iter().find(|s| s.codec_type.as_deref() == Some("video")));

    let duration = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds)
        .or_else(|| {
            video_stream
                .and_then(|s| s.duration.as_deref())
                .and_then(parse_seconds)
        })
        .unwrap_or(0.0);

    Ok(ProbeMetadata {
        duration,
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        codec_name: video_stream.and_then(|s| s.codec_name.clone()),
        format_name: output.format.and_then(|f| f.format_name),
    })
}

/// Run ffprobe on a file and return its metadata.
pub fn probe_file(ffprobe: &Path, path: &Path) -> Result<ProbeMetadata, AppError> {
    let path_str = path.to_string_lossy();
    log::debug!(
        target: "fit_size::engine::ffprobe",
        "probe: path={}",
        path_str
    );

    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        &path_str,
    ]);
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let output = cmd
        .output()
        .map_err(|e| AppError::probe(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::probe(format!("ffprobe failed: {}", stderr.trim())));
    }

    let json = String::from_utf8(output.stdout)
        .map_err(|_| AppError::probe("ffprobe output was not valid UTF-8"))?;

    parse_ffprobe_json(&json)
}
