//! Locating the `ffmpeg` and `ffprobe` binaries.
//!
//! Order: explicit override (config / env), common install paths, then `which`/`where`.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::AppError;

#[cfg(windows)]
const EXE_SUFFIX: &str = ".exe";
#[cfg(not(windows))]
const EXE_SUFFIX: &str = "";

fn common_dirs() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin"),
            PathBuf::from("/usr/local/bin"),
            PathBuf::from("/opt/local/bin"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![PathBuf::from("/usr/bin"), PathBuf::from("/usr/local/bin")]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let lookup = if cfg!(windows) { "where" } else { "which" };
    let output = Command::new(lookup).arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(PathBuf::from(first))
    }
}

/// Resolve a binary such as `ffmpeg`. An override that does not exist is an error rather
/// than silently falling back, so a misconfigured path is visible.
pub fn find_binary(name: &str, override_path: Option<&Path>) -> Result<PathBuf, AppError> {
    if let Some(path) = override_path {
        if path.exists() {
            log::debug!(
                target: "fit_size::engine::discovery",
                "{} from override: {}",
                name,
                path.display()
            );
            return Ok(path.to_path_buf());
        }
        return Err(AppError::FfmpegNotFound(format!(
            "Configured {} path does not exist: {}",
            name,
            path.display()
        )));
    }

    let file_name = format!("{}{}", name, EXE_SUFFIX);
    for dir in common_dirs() {
        let path = dir.join(&file_name);
        if path.exists() {
            log::debug!(
                target: "fit_size::engine::discovery",
                "{} found in common path: {}",
                name,
                path.display()
            );
            return Ok(path);
        }
    }

    if let Some(path) = find_in_path(name) {
        log::debug!(
            target: "fit_size::engine::discovery",
            "{} found in PATH: {}",
            name,
            path.display()
        );
        return Ok(path);
    }

    Err(AppError::FfmpegNotFound(format!(
        "{} not found. Install FFmpeg or set {}_PATH.",
        name,
        name.to_ascii_uppercase()
    )))
}
