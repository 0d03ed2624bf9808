//! Runtime configuration from environment variables.

use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::{FfmpegEngine, VideoEncodeSettings};
use crate::storage::{JsonFileStore, KeyValueStore, MemoryStore};

pub const ENV_FFMPEG_PATH: &str = "FFMPEG_PATH";
pub const ENV_FFPROBE_PATH: &str = "FFPROBE_PATH";
pub const ENV_DATA_DIR: &str = "FIT_SIZE_DATA_DIR";
pub const ENV_VIDEO_CODEC: &str = "FIT_SIZE_VIDEO_CODEC";
pub const ENV_VIDEO_PRESET: &str = "FIT_SIZE_VIDEO_PRESET";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Where history is persisted. `None` keeps history in memory for the session.
    pub data_dir: Option<PathBuf>,
    pub video: VideoEncodeSettings,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            ffmpeg_path: non_empty_var(ENV_FFMPEG_PATH).map(PathBuf::from),
            ffprobe_path: non_empty_var(ENV_FFPROBE_PATH).map(PathBuf::from),
            data_dir: non_empty_var(ENV_DATA_DIR).map(PathBuf::from),
            video: VideoEncodeSettings {
                codec: non_empty_var(ENV_VIDEO_CODEC),
                preset: non_empty_var(ENV_VIDEO_PRESET),
                ..Default::default()
            },
        };
        log::debug!(target: "fit_size::config", "Loaded config: {:?}", config);
        config
    }

    pub fn build_engine(&self) -> FfmpegEngine {
        FfmpegEngine::new(
            self.ffmpeg_path.clone(),
            self.ffprobe_path.clone(),
            self.video.clone(),
        )
    }

    pub fn build_store(&self) -> Arc<dyn KeyValueStore> {
        match &self.data_dir {
            Some(dir) => Arc::new(JsonFileStore::new(dir)),
            None => Arc::new(MemoryStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: [&str; 5] = [
        ENV_FFMPEG_PATH,
        ENV_FFPROBE_PATH,
        ENV_DATA_DIR,
        ENV_VIDEO_CODEC,
        ENV_VIDEO_PRESET,
    ];

    fn clear_env() {
        for var in ALL_VARS {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn empty_environment_gives_defaults() {
        clear_env();
        let config = AppConfig::from_env();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.video.effective_codec(), "libx264");
    }

    #[test]
    #[serial]
    fn reads_all_variables() {
        clear_env();
        unsafe {
            std::env::set_var(ENV_FFMPEG_PATH, "/opt/ff/ffmpeg");
            std::env::set_var(ENV_FFPROBE_PATH, "/opt/ff/ffprobe");
            std::env::set_var(ENV_DATA_DIR, "/var/lib/fit-size");
            std::env::set_var(ENV_VIDEO_CODEC, "libx265");
            std::env::set_var(ENV_VIDEO_PRESET, "fast");
        }
        let config = AppConfig::from_env();
        clear_env();
        assert_eq!(config.ffmpeg_path, Some(PathBuf::from("/opt/ff/ffmpeg")));
        assert_eq!(config.ffprobe_path, Some(PathBuf::from("/opt/ff/ffprobe")));
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/fit-size")));
        assert_eq!(config.video.effective_codec(), "libx265");
        assert_eq!(config.video.effective_preset(), "fast");
    }

    #[test]
    #[serial]
    fn blank_values_are_ignored() {
        clear_env();
        unsafe { std::env::set_var(ENV_FFMPEG_PATH, "   ") };
        let config = AppConfig::from_env();
        clear_env();
        assert_eq!(config.ffmpeg_path, None);
    }

    #[test]
    fn data_dir_selects_file_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let store = config.build_store();
        store.set("k", serde_json::json!(1)).expect("set");
        assert!(dir.path().join("k.json").exists());
    }
}
