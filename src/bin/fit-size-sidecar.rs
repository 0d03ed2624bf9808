use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use fit_size_core::config::AppConfig;
use fit_size_core::error::AppError;
use fit_size_core::orchestrator::Orchestrator;
use fit_size_core::sidecar_api::{self, CompressParams, EmitterObserver};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

const STARTUP_CLEANUP_MAX_AGE_HOURS: u64 = 24;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Clone)]
struct JobState {
    active_job: Arc<Mutex<Option<u64>>>,
    next_job_id: Arc<AtomicU64>,
}

impl JobState {
    fn new() -> Self {
        Self {
            active_job: Arc::new(Mutex::new(None)),
            next_job_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Claim the single job slot before touching the input file.
    fn begin_job(&self) -> Result<u64, AppError> {
        let mut guard = self.active_job.lock();
        if guard.is_some() {
            return Err(AppError::Busy);
        }
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        *guard = Some(job_id);
        Ok(job_id)
    }

    fn finish_job(&self, job_id: u64) {
        let mut guard = self.active_job.lock();
        if *guard == Some(job_id) {
            *guard = None;
        }
    }
}

struct ActiveJobGuard {
    state: JobState,
    job_id: u64,
}

impl ActiveJobGuard {
    fn new(state: JobState, job_id: u64) -> Self {
        Self { state, job_id }
    }
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        self.state.finish_job(self.job_id);
    }
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn emit_rpc_event(writer: &SharedWriter, event: &str, payload: Value) {
    let message = RpcEvent {
        event: event.to_string(),
        payload,
    };
    let _ = write_json_line_shared(writer, &message);
}

fn parse_error_payload(err: &AppError) -> RpcErrorPayload {
    match err {
        AppError::EngineFailed { code, stderr } if *code == -1 => RpcErrorPayload {
            summary: stderr.clone(),
            detail: stderr.clone(),
        },
        AppError::EngineFailed { code, stderr } => {
            let parsed = fit_size_core::engine::parse_ffmpeg_error(stderr, Some(*code));
            RpcErrorPayload {
                summary: err.user_message(),
                detail: parsed.detail,
            }
        }
        _ => {
            let text = err.user_message();
            RpcErrorPayload {
                summary: text.clone(),
                detail: format!("{:?}", err),
            }
        }
    }
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::validation(format!("Invalid params payload: {}", e)))
}

fn to_result_value<T: serde::Serialize>(value: T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::from(format!("Failed to serialize {}: {}", what, e)))
}

fn is_async_request(method: &str) -> bool {
    method == "media.compress"
}

fn dispatch_sync(method: &str, orchestrator: &Orchestrator) -> Result<Value, AppError> {
    match method {
        "presets.list" => to_result_value(sidecar_api::list_presets(), "presets"),
        "job.state" => to_result_value(sidecar_api::job_state(orchestrator), "job state"),
        "job.reset" => to_result_value(sidecar_api::job_reset(orchestrator), "reset result"),
        "history.list" => to_result_value(sidecar_api::history_list(orchestrator), "history"),
        _ => Err(AppError::from(format!("Unknown method: {}", method))),
    }
}

fn write_response(writer: &SharedWriter, id: u64, result: Result<Value, AppError>) {
    let response = match result {
        Ok(result) => serde_json::to_value(RpcSuccess { id, result })
            .map_err(|e| io::Error::other(format!("serialize success: {}", e))),
        Err(err) => serde_json::to_value(RpcFailure {
            id,
            error: parse_error_payload(&err),
        })
        .map_err(|e| io::Error::other(format!("serialize failure: {}", e))),
    };

    match response {
        Ok(value) => {
            let _ = write_json_line_shared(writer, &value);
        }
        Err(err) => {
            let failure = RpcFailure {
                id,
                error: RpcErrorPayload {
                    summary: "Serialization error".to_string(),
                    detail: err.to_string(),
                },
            };
            let _ = write_json_line_shared(writer, &failure);
        }
    }
}

fn handle_media_compress(
    request: RpcRequest,
    writer: &SharedWriter,
    jobs: &JobState,
    orchestrator: &Orchestrator,
) {
    let params: CompressParams = match params_from_value(request.params) {
        Ok(params) => params,
        Err(err) => {
            write_response(writer, request.id, Err(err));
            return;
        }
    };

    let job_id = match jobs.begin_job() {
        Ok(job_id) => job_id,
        Err(err) => {
            write_response(writer, request.id, Err(err));
            return;
        }
    };
    let _job_guard = ActiveJobGuard::new(jobs.clone(), job_id);

    let progress_writer = Arc::clone(writer);
    let status_writer = Arc::clone(writer);
    let observer = EmitterObserver::new(
        Arc::new(move |progress: f64| {
            emit_rpc_event(
                &progress_writer,
                "media.job.progress",
                json!({ "jobId": job_id, "progress": progress }),
            )
        }),
        Arc::new(move |status: &str| {
            emit_rpc_event(
                &status_writer,
                "media.job.status",
                json!({ "jobId": job_id, "status": status }),
            )
        }),
    );

    let result = sidecar_api::compress_media_with_events(orchestrator, params, &observer);
    let result = match result {
        Ok(result) => {
            emit_rpc_event(
                writer,
                "media.job.complete",
                json!({
                    "jobId": job_id,
                    "outputPath": result.output_path,
                    "compressedSize": result.compressed_size,
                }),
            );
            to_result_value(result, "compress result")
        }
        Err(err) => {
            let payload = parse_error_payload(&err);
            emit_rpc_event(
                writer,
                "media.job.error",
                json!({
                    "jobId": job_id,
                    "summary": payload.summary,
                    "detail": payload.detail,
                }),
            );
            Err(err)
        }
    };
    write_response(writer, request.id, result);
}

fn main() -> io::Result<()> {
    fit_size_core::init_logging();
    sidecar_api::cleanup_startup_temp(Duration::from_secs(STARTUP_CLEANUP_MAX_AGE_HOURS * 3600));

    let config = AppConfig::from_env();
    let orchestrator = Arc::new(Orchestrator::with_store(
        Arc::new(config.build_engine()),
        config.build_store(),
    ));
    log::info!(target: "fit_size::sidecar", "Sidecar ready");

    let stdin = io::stdin();
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let jobs = JobState::new();
    let mut async_workers: Vec<thread::JoinHandle<()>> = Vec::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid input stream".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid request".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if is_async_request(&request.method) {
            let writer = Arc::clone(&stdout);
            let job_state = jobs.clone();
            let orchestrator = Arc::clone(&orchestrator);
            let worker = thread::spawn(move || {
                handle_media_compress(request, &writer, &job_state, &orchestrator);
            });
            async_workers.push(worker);
        } else {
            let result = dispatch_sync(&request.method, &orchestrator);
            write_response(&stdout, request.id, result);
        }
    }

    for worker in async_workers {
        let _ = worker.join();
    }

    log::info!(target: "fit_size::sidecar", "Input closed, exiting");
    Ok(())
}
