//! Scratch files for engine invocations.
//!
//! Every file an engine call creates is registered with a [`ScratchFiles`] guard, which
//! removes them when dropped, on success and failure alike.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

const SCRATCH_PREFIX: &str = "fit-size-";

static NEXT_SCRATCH_ID: AtomicU64 = AtomicU64::new(0);

fn scratch_path(dir: &Path, suffix: &str) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let id = NEXT_SCRATCH_ID.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(
        "{}{}-{}-{}-{}",
        SCRATCH_PREFIX,
        millis,
        std::process::id(),
        id,
        suffix
    ))
}

/// Scoped set of scratch files, removed on drop.
#[derive(Debug)]
pub struct ScratchFiles {
    dir: PathBuf,
    paths: Vec<PathBuf>,
}

impl Default for ScratchFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::in_dir(std::env::temp_dir())
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            paths: Vec::new(),
        }
    }

    /// Write `content` to a new scratch file and track it.
    pub fn write(&mut self, suffix: &str, content: &[u8]) -> io::Result<PathBuf> {
        let path = scratch_path(&self.dir, suffix);
        self.paths.push(path.clone());
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Reserve a path for a file some other process will create; tracked like written files.
    pub fn reserve(&mut self, suffix: &str) -> PathBuf {
        let path = scratch_path(&self.dir, suffix);
        self.paths.push(path.clone());
        path
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!(
                    target: "fit_size::engine::temp",
                    "Failed to remove scratch file {}: {}",
                    path.display(),
                    e
                ),
            }
        }
    }
}

/// Remove scratch files older than `max_age` left behind by a crashed run.
pub fn cleanup_old_temp_files(max_age: Duration) {
    cleanup_old_temp_files_in(&std::env::temp_dir(), max_age);
}

fn cleanup_old_temp_files_in(dir: &Path, max_age: Duration) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let now = SystemTime::now();
    let mut removed = 0usize;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(SCRATCH_PREFIX) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age > max_age && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        log::info!(
            target: "fit_size::engine::temp",
            "Removed {} stale scratch file(s) from {}",
            removed,
            dir.display()
        );
    }
}
