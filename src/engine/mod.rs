//! Codec engine: the seam between the orchestrator and the tools that actually encode.
//!
//! [`CodecEngine`] is the injected dependency; [`FfmpegEngine`] is the production
//! implementation (FFmpeg/ffprobe for video, the `image` crate for stills).

mod builder;
pub mod discovery;
mod error;
pub mod ffprobe;
mod progress;
mod runner;
mod still_image;
mod temp;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;

pub use builder::{build_video_args, format_args_for_display_multiline};
pub use error::{EngineErrorPayload, parse_ffmpeg_error};
pub use progress::parse_ffmpeg_progress;
pub use runner::{ProgressCallback, run_ffmpeg_blocking};
pub use still_image::{
    DEFAULT_IMAGE_MAX_DIMENSION, ImageParams, UNBOUNDED_IMAGE_DIMENSION, compress_image_bytes,
};
pub use temp::{ScratchFiles, cleanup_old_temp_files};

use crate::error::AppError;
use crate::media::MediaFile;
use crate::plan::EncodePlan;

pub const STATUS_LOADING: &str = "Loading file";
pub const STATUS_ENCODING: &str = "Encoding";

/// Message from a running engine call back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Fraction complete in [0,1].
    Progress(f64),
    Status(String),
}

/// Sending half of the engine event channel. Sends never fail: once the receiver is gone
/// events are dropped.
#[derive(Debug, Clone, Default)]
pub struct EngineEvents {
    tx: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl EngineEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Events go nowhere.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn progress(&self, fraction: f64) {
        self.send(EngineEvent::Progress(fraction));
    }

    pub fn status(&self, label: impl Into<String>) {
        self.send(EngineEvent::Status(label.into()));
    }

    fn send(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Probe result. Values are reported as-is; the orchestrator decides what is usable.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
}

/// Encoder that turns bytes plus parameters into compressed bytes.
///
/// Calls block; the orchestrator runs them off the async runtime. Implementations must
/// release every temporary they create before returning, on success and on failure.
pub trait CodecEngine: Send + Sync {
    fn probe(&self, file: &MediaFile) -> Result<VideoInfo, AppError>;

    fn compress_image(
        &self,
        file: &MediaFile,
        params: &ImageParams,
        events: &EngineEvents,
    ) -> Result<Vec<u8>, AppError>;

    fn transcode_video(
        &self,
        file: &MediaFile,
        plan: &EncodePlan,
        events: &EngineEvents,
    ) -> Result<Vec<u8>, AppError>;
}

/// Video encoder knobs that are not derived from the size budget.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoEncodeSettings {
    pub codec: Option<String>,
    pub preset: Option<String>,
    pub tune: Option<String>,
    pub audio_channels: Option<u32>,
    pub container: Option<String>,
}

impl VideoEncodeSettings {
    pub fn effective_codec(&self) -> &str {
        self.codec.as_deref().unwrap_or("libx264")
    }

    pub fn effective_preset(&self) -> &str {
        self.preset.as_deref().unwrap_or("ultrafast")
    }

    pub fn effective_tune(&self) -> &str {
        self.tune.as_deref().unwrap_or("zerolatency")
    }

    pub fn effective_audio_channels(&self) -> u32 {
        self.audio_channels.unwrap_or(2)
    }

    pub fn effective_container(&self) -> &str {
        self.container.as_deref().unwrap_or("mp4")
    }
}

pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Lazily resolved binary path. Failures are not cached so a later install is picked up.
#[derive(Debug)]
struct BinarySlot {
    name: &'static str,
    override_path: Option<PathBuf>,
    resolved: Mutex<Option<PathBuf>>,
}

impl BinarySlot {
    fn new(name: &'static str, override_path: Option<PathBuf>) -> Self {
        Self {
            name,
            override_path,
            resolved: Mutex::new(None),
        }
    }

    fn get(&self) -> Result<PathBuf, AppError> {
        let mut resolved = self.resolved.lock();
        if let Some(path) = resolved.as_ref() {
            return Ok(path.clone());
        }
        let path = discovery::find_binary(self.name, self.override_path.as_deref())?;
        *resolved = Some(path.clone());
        Ok(path)
    }
}

/// Production engine: FFmpeg for video, in-process `image` for stills.
#[derive(Debug)]
pub struct FfmpegEngine {
    ffmpeg: BinarySlot,
    ffprobe: BinarySlot,
    settings: VideoEncodeSettings,
    scratch_dir: PathBuf,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(None, None, VideoEncodeSettings::default())
    }
}

impl FfmpegEngine {
    pub fn new(
        ffmpeg_path: Option<PathBuf>,
        ffprobe_path: Option<PathBuf>,
        settings: VideoEncodeSettings,
    ) -> Self {
        Self {
            ffmpeg: BinarySlot::new("ffmpeg", ffmpeg_path),
            ffprobe: BinarySlot::new("ffprobe", ffprobe_path),
            settings,
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn settings(&self) -> &VideoEncodeSettings {
        &self.settings
    }

    fn input_suffix(file: &MediaFile) -> String {
        match file.extension() {
            Some(ext) => format!("input.{}", ext),
            None => "input".to_string(),
        }
    }
}

impl CodecEngine for FfmpegEngine {
    fn probe(&self, file: &MediaFile) -> Result<VideoInfo, AppError> {
        let ffprobe = self.ffprobe.get()?;
        let mut scratch = ScratchFiles::in_dir(&self.scratch_dir);
        let input = scratch.write(&Self::input_suffix(file), file.bytes())?;
        let meta = ffprobe::probe_file(&ffprobe, &input)?;
        log::debug!(
            target: "fit_size::engine",
            "Probed {}: duration={}s, {}x{}, codec={:?}",
            file.name(),
            meta.duration,
            meta.width,
            meta.height,
            meta.codec_name
        );
        Ok(VideoInfo {
            duration_seconds: meta.duration,
            width: meta.width,
            height: meta.height,
        })
    }

    fn compress_image(
        &self,
        file: &MediaFile,
        params: &ImageParams,
        events: &EngineEvents,
    ) -> Result<Vec<u8>, AppError> {
        events.status(STATUS_ENCODING);
        compress_image_bytes(file.bytes(), params, |p| events.progress(p))
    }

    fn transcode_video(
        &self,
        file: &MediaFile,
        plan: &EncodePlan,
        events: &EngineEvents,
    ) -> Result<Vec<u8>, AppError> {
        let ffmpeg = self.ffmpeg.get()?;
        let mut scratch = ScratchFiles::in_dir(&self.scratch_dir);

        events.status(STATUS_LOADING);
        let input = scratch.write(&Self::input_suffix(file), file.bytes())?;
        let output = scratch.reserve(&format!("output.{}", self.settings.effective_container()));

        let args = build_video_args(
            &path_to_string(&input),
            &path_to_string(&output),
            plan,
            &self.settings,
        );
        log::debug!(
            target: "fit_size::engine",
            "FFmpeg args:\n{}",
            format_args_for_display_multiline(&args)
        );

        events.status(STATUS_ENCODING);
        let progress_events = events.clone();
        let callback: ProgressCallback = Arc::new(move |p| progress_events.progress(p));
        run_ffmpeg_blocking(&ffmpeg, args, Some(plan.duration_seconds), Some(callback))?;

        let bytes = fs::read(&output)?;
        log::info!(
            target: "fit_size::engine",
            "Encoded {} -> {} bytes",
            file.size(),
            bytes.len()
        );
        Ok(bytes)
    }
}
