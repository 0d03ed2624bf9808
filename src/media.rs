//! Input and output types for a single compression job.

use std::path::Path;
use std::sync::Arc;

use crate::error::AppError;

/// Declared kind of a selected file, derived from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("video/") {
            MediaKind::Video
        } else if mime.starts_with("image/") {
            MediaKind::Image
        } else {
            MediaKind::Other
        }
    }
}

/// Guess a MIME type from a file extension. Unknown extensions map to `application/octet-stream`.
pub fn guess_mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// A user-selected file. Immutable once created.
#[derive(Debug, Clone)]
pub struct MediaFile {
    name: String,
    mime: String,
    bytes: Arc<[u8]>,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, using `mime` when given and the extension otherwise.
    pub fn from_path(path: &Path, mime: Option<&str>) -> Result<Self, AppError> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        let mime = mime
            .map(str::to_string)
            .unwrap_or_else(|| guess_mime_from_path(path).to_string());
        Ok(Self::new(name, mime, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_mime(&self.mime)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lowercase extension of the display name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Size budget and resolution flag for one job.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionRequest {
    pub target_size_mb: f64,
    pub preserve_resolution: bool,
}

impl CompressionRequest {
    pub fn new(target_size_mb: f64, preserve_resolution: bool) -> Self {
        Self {
            target_size_mb,
            preserve_resolution,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.target_size_mb.is_finite() || self.target_size_mb <= 0.0 {
            return Err(AppError::validation(format!(
                "Target size must be greater than 0 MB (got {})",
                self.target_size_mb
            )));
        }
        Ok(())
    }
}

/// Output of a successful job. Owned by the caller once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub bytes: Vec<u8>,
    pub compressed_size: u64,
    /// Download name for the compressed file (`compressed_<original name>`).
    pub file_name: String,
}

impl CompressionResult {
    pub fn new(bytes: Vec<u8>, original_name: &str) -> Self {
        let compressed_size = bytes.len() as u64;
        Self {
            bytes,
            compressed_size,
            file_name: compressed_file_name(original_name),
        }
    }

    /// Size reduction relative to `original_size` in percent. Negative when the output grew.
    pub fn reduction_percent(&self, original_size: u64) -> f64 {
        if original_size == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_size as f64 / original_size as f64) * 100.0
    }
}

pub fn compressed_file_name(original_name: &str) -> String {
    format!("compressed_{}", original_name)
}

/// Human-readable byte size (B, KB, MB with two decimals).
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
    }
}
