//! App error type for compression jobs and sidecar commands. Implements Display and Serialize for frontend.

use crate::engine::parse_ffmpeg_error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Rejected before a job enters Processing (unsupported kind, bad target size, no file).
    #[error("{0}")]
    Validation(String),

    #[error("Another compression job is already running")]
    Busy,

    #[error("{0}")]
    InvalidState(String),

    #[error("Could not read video info: {0}")]
    Probe(String),

    #[error("{0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg failed (code {code}): {stderr}")]
    EngineFailed { code: i32, stderr: String },

    #[error("Image compression failed: {0}")]
    Image(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Unknown(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn probe(message: impl Into<String>) -> Self {
        Self::Probe(message.into())
    }

    pub fn engine_failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::EngineFailed {
            code,
            stderr: stderr.into(),
        }
    }

    /// Short, non-empty message shown for a failed job.
    pub fn user_message(&self) -> String {
        let message = match self {
            AppError::EngineFailed { code, stderr } => {
                format!(
                    "Video conversion failed (exit code {}): {}",
                    code,
                    parse_ffmpeg_error(stderr, Some(*code)).summary
                )
            }
            other => other.to_string(),
        };
        if message.trim().is_empty() {
            "An error occurred during compression".to_string()
        } else {
            message
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AppError::EngineFailed { code, stderr } => {
                let payload = parse_ffmpeg_error(stderr, Some(*code));
                let json =
                    serde_json::json!({ "summary": payload.summary, "detail": payload.detail });
                serializer.serialize_str(&json.to_string())
            }
            _ => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Unknown(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

impl From<image::ImageError> for AppError {
    fn from(e: image::ImageError) -> Self {
        AppError::Image(e.to_string())
    }
}
