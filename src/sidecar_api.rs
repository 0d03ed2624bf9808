//! Operations behind the sidecar RPC methods. The binary owns the wire plumbing; this module
//! owns what each method does.

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::history::HistoryRecord;
use crate::media::{CompressionRequest, MediaFile, format_file_size};
use crate::orchestrator::{JobObserver, JobSnapshot, JobState, Orchestrator};
use crate::presets::{CompressionSettings, PresetGroup, list_groups};

pub type ProgressEmitter = Arc<dyn Fn(f64) + Send + Sync>;
pub type StatusEmitter = Arc<dyn Fn(&str) + Send + Sync>;

/// Forwards job callbacks to RPC event emitters.
pub struct EmitterObserver {
    progress: ProgressEmitter,
    status: StatusEmitter,
}

impl EmitterObserver {
    pub fn new(progress: ProgressEmitter, status: StatusEmitter) -> Self {
        Self { progress, status }
    }
}

impl JobObserver for EmitterObserver {
    fn on_progress(&self, percent: f64) {
        (self.progress)(percent);
    }

    fn on_status(&self, label: &str) {
        (self.status)(label);
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressParams {
    pub input_path: PathBuf,
    pub mime_type: Option<String>,
    pub target_size_mb: Option<f64>,
    pub preset_name: Option<String>,
    #[serde(default = "default_true")]
    pub preserve_resolution: bool,
    pub output_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressResult {
    pub output_path: String,
    pub file_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub reduction_percent: f64,
    pub original_size_label: String,
    pub compressed_size_label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResult {
    pub reset: bool,
    pub state: JobState,
}

fn block_on_async<T>(future: impl Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::from(format!("Failed to initialize async runtime: {}", e)))?;
    runtime.block_on(future)
}

pub fn list_presets() -> &'static [PresetGroup] {
    list_groups()
}

pub fn job_state(orchestrator: &Orchestrator) -> JobSnapshot {
    orchestrator.snapshot()
}

pub fn job_reset(orchestrator: &Orchestrator) -> ResetResult {
    let reset = orchestrator.reset();
    ResetResult {
        reset,
        state: orchestrator.state(),
    }
}

pub fn history_list(orchestrator: &Orchestrator) -> Vec<HistoryRecord> {
    orchestrator.history()
}

/// Turn RPC params into a request. A preset sets the target to its safe value; an explicit
/// `targetSizeMb` then overrides it, the same way a manual edit clears a preset selection.
pub fn resolve_request(params: &CompressParams) -> Result<CompressionRequest, AppError> {
    let mut settings = CompressionSettings::default();
    settings.set_preserve_resolution(params.preserve_resolution);
    if let Some(name) = params.preset_name.as_deref()
        && settings.select_preset(name).is_none()
    {
        return Err(AppError::validation(format!("Unknown preset: {}", name)));
    }
    if let Some(size) = params.target_size_mb
        && !settings.set_target_size_mb(size)
    {
        return Err(AppError::validation(format!(
            "Target size must be greater than 0 MB (got {})",
            size
        )));
    }
    Ok(settings.to_request())
}

/// Read the input, run it through the orchestrator and write the compressed file.
pub fn compress_media_with_events(
    orchestrator: &Orchestrator,
    params: CompressParams,
    observer: &dyn JobObserver,
) -> Result<CompressResult, AppError> {
    let request = resolve_request(&params)?;
    let file = MediaFile::from_path(&params.input_path, params.mime_type.as_deref())?;
    let original_size = file.size();

    let result = block_on_async(orchestrator.compress(file, request, observer))?;

    let output_path = params
        .output_path
        .clone()
        .unwrap_or_else(|| params.input_path.with_file_name(&result.file_name));
    fs::write(&output_path, &result.bytes)?;
    log::info!(
        target: "fit_size::sidecar_api",
        "Wrote {} ({})",
        output_path.display(),
        format_file_size(result.compressed_size)
    );

    Ok(CompressResult {
        output_path: output_path.to_string_lossy().into_owned(),
        file_name: result.file_name.clone(),
        original_size,
        compressed_size: result.compressed_size,
        reduction_percent: result.reduction_percent(original_size),
        original_size_label: format_file_size(original_size),
        compressed_size_label: format_file_size(result.compressed_size),
    })
}

pub fn cleanup_startup_temp(max_age: Duration) {
    crate::engine::cleanup_old_temp_files(max_age);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(json: serde_json::Value) -> CompressParams {
        serde_json::from_value(json).expect("params")
    }

    #[test]
    fn preset_sets_safe_value() {
        let p = params(serde_json::json!({ "inputPath": "/a.mp4", "presetName": "Discord (Free)" }));
        let request = resolve_request(&p).expect("request");
        assert_eq!(request.target_size_mb, 7.8);
        assert!(request.preserve_resolution);
    }

    #[test]
    fn explicit_size_overrides_preset() {
        let p = params(serde_json::json!({
            "inputPath": "/a.mp4",
            "presetName": "Etsy",
            "targetSizeMb": 3.0,
            "preserveResolution": false
        }));
        let request = resolve_request(&p).expect("request");
        assert_eq!(request.target_size_mb, 3.0);
        assert!(!request.preserve_resolution);
    }

    #[test]
    fn neither_size_nor_preset_uses_default() {
        let p = params(serde_json::json!({ "inputPath": "/a.mp4" }));
        assert_eq!(resolve_request(&p).expect("request").target_size_mb, 19.5);
    }

    #[test]
    fn unknown_preset_is_validation_error() {
        let p = params(serde_json::json!({ "inputPath": "/a.mp4", "presetName": "MySpace" }));
        assert!(matches!(resolve_request(&p), Err(AppError::Validation(_))));
    }

    #[test]
    fn non_positive_size_is_validation_error() {
        let p = params(serde_json::json!({ "inputPath": "/a.mp4", "targetSizeMb": -1.0 }));
        assert!(matches!(resolve_request(&p), Err(AppError::Validation(_))));
    }

    #[test]
    fn presets_serialize_for_rpc() {
        let value = serde_json::to_value(list_presets()).expect("serialize");
        assert_eq!(value[0]["label"], "Handmade & Marketplaces");
        assert_eq!(value[0]["items"][0]["safeValueMb"], 19.5);
    }
}
