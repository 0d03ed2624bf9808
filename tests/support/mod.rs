#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use fit_size_core::engine::{CodecEngine, EngineEvents, ImageParams, VideoInfo};
use fit_size_core::error::AppError;
use fit_size_core::media::MediaFile;
use fit_size_core::orchestrator::JobObserver;
use fit_size_core::plan::EncodePlan;
use parking_lot::Mutex;

/// Counts engine-held buffers that are still alive.
#[derive(Debug, Default, Clone)]
pub struct LiveBuffers(Arc<AtomicUsize>);

impl LiveBuffers {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn acquire(&self, bytes: &[u8]) -> BufferGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        BufferGuard {
            live: self.clone(),
            _data: bytes.to_vec(),
        }
    }
}

struct BufferGuard {
    live: LiveBuffers,
    _data: Vec<u8>,
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        self.live.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What the scripted engine does on the next call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Probe returns `info`; encodes return `output_size` bytes.
    Succeed { info: VideoInfo, output_size: usize },
    /// Probe succeeds; the encoder exits with `code`.
    EngineFails { info: VideoInfo, code: i32 },
    ProbeFails,
}

/// Blocks an encode until the test releases it.
pub struct Gate {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

pub struct GateHandle {
    pub entered: mpsc::Receiver<()>,
    pub release: mpsc::Sender<()>,
}

pub fn gate() -> (Gate, GateHandle) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    (
        Gate {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        },
        GateHandle {
            entered: entered_rx,
            release: release_tx,
        },
    )
}

pub struct ScriptedEngine {
    script: Script,
    pub live: LiveBuffers,
    pub plans: Mutex<Vec<EncodePlan>>,
    pub image_params: Mutex<Vec<ImageParams>>,
    gate: Option<Gate>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            live: LiveBuffers::default(),
            plans: Mutex::new(Vec::new()),
            image_params: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn succeeding(duration_seconds: f64, width: u32, height: u32, output_size: usize) -> Self {
        Self::new(Script::Succeed {
            info: VideoInfo {
                duration_seconds,
                width,
                height,
            },
            output_size,
        })
    }

    pub fn failing(code: i32) -> Self {
        Self::new(Script::EngineFails {
            info: VideoInfo {
                duration_seconds: 10.0,
                width: 640,
                height: 480,
            },
            code,
        })
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    fn wait_at_gate(&self) {
        if let Some(gate) = &self.gate {
            let _ = gate.entered.lock().send(());
            let _ = gate.release.lock().recv();
        }
    }

    fn encode(&self, file: &MediaFile, events: &EngineEvents) -> Result<Vec<u8>, AppError> {
        let _input = self.live.acquire(file.bytes());
        events.status("Encoding");
        events.progress(0.5);
        self.wait_at_gate();
        match &self.script {
            Script::Succeed { output_size, .. } => {
                let _output = self.live.acquire(&vec![0u8; *output_size]);
                events.progress(1.0);
                Ok(vec![9u8; *output_size])
            }
            Script::EngineFails { code, .. } => {
                let _output = self.live.acquire(&[]);
                Err(AppError::engine_failed(*code, "Error while encoding\nConversion failed!"))
            }
            Script::ProbeFails => Err(AppError::from("encode without probe")),
        }
    }
}

impl CodecEngine for ScriptedEngine {
    fn probe(&self, file: &MediaFile) -> Result<VideoInfo, AppError> {
        let _input = self.live.acquire(file.bytes());
        match &self.script {
            Script::Succeed { info, .. } | Script::EngineFails { info, .. } => Ok(*info),
            Script::ProbeFails => Err(AppError::probe("moov atom not found")),
        }
    }

    fn compress_image(
        &self,
        file: &MediaFile,
        params: &ImageParams,
        events: &EngineEvents,
    ) -> Result<Vec<u8>, AppError> {
        self.image_params.lock().push(*params);
        self.encode(file, events)
    }

    fn transcode_video(
        &self,
        file: &MediaFile,
        plan: &EncodePlan,
        events: &EngineEvents,
    ) -> Result<Vec<u8>, AppError> {
        self.plans.lock().push(*plan);
        self.encode(file, events)
    }
}

/// Records every observer callback.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub progress: Mutex<Vec<f64>>,
    pub statuses: Mutex<Vec<String>>,
}

impl JobObserver for RecordingObserver {
    fn on_progress(&self, percent: f64) {
        self.progress.lock().push(percent);
    }

    fn on_status(&self, label: &str) {
        self.statuses.lock().push(label.to_string());
    }
}

pub fn video_file(name: &str, size: usize) -> MediaFile {
    MediaFile::new(name, "video/mp4", vec![1u8; size])
}

pub fn image_file(name: &str, size: usize) -> MediaFile {
    MediaFile::new(name, "image/jpeg", vec![2u8; size])
}

/// Deterministic noisy RGB PNG; noise keeps the PNG large relative to a JPEG of it.
pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::ImageBuffer::from_fn(width, height, |x, y| {
        let v = x.wrapping_mul(2_654_435_761).wrapping_add(y.wrapping_mul(40_503));
        image::Rgb([(v >> 3) as u8, (v >> 11) as u8, (v >> 19) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub struct IntegrationEnv {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    dir: tempfile::TempDir,
}

impl IntegrationEnv {
    pub fn new() -> Self {
        let ffmpeg_override = std::env::var_os("FFMPEG_PATH").map(PathBuf::from);
        let ffprobe_override = std::env::var_os("FFPROBE_PATH").map(PathBuf::from);
        let ffmpeg = fit_size_core::engine::discovery::find_binary("ffmpeg", ffmpeg_override.as_deref())
            .expect("FFmpeg not found");
        let ffprobe =
            fit_size_core::engine::discovery::find_binary("ffprobe", ffprobe_override.as_deref())
                .expect("ffprobe not found");
        let dir = tempfile::tempdir().expect("tempdir");
        Self {
            ffmpeg,
            ffprobe,
            dir,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn with_test_video(&self, input_name: &str, duration_secs: f32, size: &str) -> PathBuf {
        let output_path = self.path(input_name);
        let status = create_test_video(&self.ffmpeg, &output_path, duration_secs, size)
            .expect("failed to create test video");
        assert!(status.success(), "ffmpeg failed to create test video");
        output_path
    }
}

pub fn create_test_video(
    ffmpeg: &Path,
    output_path: &Path,
    duration_secs: f32,
    size: &str,
) -> std::io::Result<ExitStatus> {
    let duration_arg = format!("{}", duration_secs);
    Command::new(ffmpeg)
        .args([
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            &format!("testsrc=duration={}:size={}:rate=30", duration_arg, size),
            "-f",
            "lavfi",
            "-i",
            &format!("sine=frequency=440:duration={}", duration_arg),
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-shortest",
            output_path.to_string_lossy().as_ref(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
}
