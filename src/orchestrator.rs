//! Single-job compression state machine.
//!
//! `Idle -> Processing -> Completed | Failed`, back to `Idle` through [`Orchestrator::reset`].
//! The engine call runs on the blocking pool; its progress and status events come back over a
//! channel and are the only thing that mutates job state while a job is in flight.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::engine::{CodecEngine, EngineEvent, EngineEvents, ImageParams};
use crate::error::AppError;
use crate::history::{HistoryLedger, HistoryRecord};
use crate::media::{CompressionRequest, CompressionResult, MediaFile, MediaKind};
use crate::plan::EncodePlan;
use crate::storage::KeyValueStore;

pub const STATUS_COMPRESSING_VIDEO: &str = "Compressing video";
pub const STATUS_READING_VIDEO_INFO: &str = "Reading video info";
pub const STATUS_COMPRESSING_IMAGE: &str = "Compressing image";
pub const STATUS_DONE: &str = "Done";
pub const STATUS_ERROR: &str = "Error";

const ABANDONED_MESSAGE: &str = "Job abandoned before it finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Processing,
    Completed,
    Failed,
}

/// Receives job progress (0-100, non-decreasing) and phase labels.
pub trait JobObserver: Send + Sync {
    fn on_progress(&self, _percent: f64) {}
    fn on_status(&self, _label: &str) {}
}

impl JobObserver for () {}

/// Read-only copy of the orchestrator state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub state: JobState,
    pub progress: f64,
    pub status: String,
    pub error: Option<String>,
    pub file_name: Option<String>,
    pub original_size: Option<u64>,
    #[serde(skip)]
    pub result: Option<CompressionResult>,
    pub compressed_size: Option<u64>,
}

#[derive(Debug)]
struct Job {
    state: JobState,
    file: Option<MediaFile>,
    result: Option<CompressionResult>,
    error: Option<String>,
    progress: f64,
    status: String,
}

impl Job {
    fn idle() -> Self {
        Self {
            state: JobState::Idle,
            file: None,
            result: None,
            error: None,
            progress: 0.0,
            status: String::new(),
        }
    }
}

pub struct Orchestrator {
    engine: Arc<dyn CodecEngine>,
    job: Mutex<Job>,
    history: Mutex<HistoryLedger>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let job = self.snapshot();
        let history = self.history();
        f.debug_struct("Orchestrator")
            .field("job", &job)
            .field("history", &history)
            .finish()
    }
}

/// Moves a Processing job to Failed if `submit` is dropped before it settles the job.
struct InFlight<'a> {
    job: &'a Mutex<Job>,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn new(job: &'a Mutex<Job>) -> Self {
        Self { job, settled: false }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut job = self.job.lock();
        if job.state == JobState::Processing {
            log::warn!(
                target: "fit_size::orchestrator",
                "Job abandoned while processing; marking it failed"
            );
            job.state = JobState::Failed;
            job.status = STATUS_ERROR.to_string();
            job.error = Some(ABANDONED_MESSAGE.to_string());
            job.result = None;
        }
    }
}

impl Orchestrator {
    /// Orchestrator with session-only history.
    pub fn new(engine: Arc<dyn CodecEngine>) -> Self {
        Self::with_history(engine, HistoryLedger::new())
    }

    /// Orchestrator whose history is loaded from and saved to `store`.
    pub fn with_store(engine: Arc<dyn CodecEngine>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_history(engine, HistoryLedger::with_store(store))
    }

    fn with_history(engine: Arc<dyn CodecEngine>, history: HistoryLedger) -> Self {
        Self {
            engine,
            job: Mutex::new(Job::idle()),
            history: Mutex::new(history),
        }
    }

    /// Select the file for the next job. Clears any previous result, error and progress.
    /// A finished job is discarded first; a running one makes this fail with `Busy`.
    pub fn select(&self, file: MediaFile) -> Result<(), AppError> {
        let mut job = self.job.lock();
        if job.state == JobState::Processing {
            return Err(AppError::Busy);
        }
        log::debug!(
            target: "fit_size::orchestrator",
            "Selected {} ({}, {} bytes)",
            file.name(),
            file.mime(),
            file.size()
        );
        *job = Job::idle();
        job.file = Some(file);
        Ok(())
    }

    /// Run the selected file through the engine. Resolves once the job is Completed or Failed.
    ///
    /// Validation failures (no file, unsupported kind, bad target size) are returned without
    /// leaving Idle. Everything after that point lands in Failed with a stored message, and
    /// the same error is returned. Dropping the future mid-job leaves the job Failed, so
    /// `reset` works again; the engine call itself still runs to its end.
    pub async fn submit(
        &self,
        request: CompressionRequest,
        observer: &dyn JobObserver,
    ) -> Result<CompressionResult, AppError> {
        let (file, initial_status) = self.begin(&request)?;
        let in_flight = InFlight::new(&self.job);
        observer.on_progress(0.0);
        observer.on_status(initial_status);

        log::info!(
            target: "fit_size::orchestrator",
            "Job started: {} ({:?}, {} bytes, target {} MB, preserve_resolution={})",
            file.name(),
            file.kind(),
            file.size(),
            request.target_size_mb,
            request.preserve_resolution
        );

        let (events, mut rx) = EngineEvents::channel();
        let engine = Arc::clone(&self.engine);
        let pipeline_file = file.clone();
        let task = tokio::task::spawn_blocking(move || {
            run_pipeline(engine.as_ref(), &pipeline_file, &request, &events)
        });

        while let Some(event) = rx.recv().await {
            self.relay(event, observer);
        }

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(AppError::Unknown(format!("Compression task failed: {}", e))),
        };

        let settled = match outcome {
            Ok(result) => {
                self.complete(&file, &result);
                observer.on_progress(100.0);
                observer.on_status(STATUS_DONE);
                Ok(result)
            }
            Err(err) => {
                self.fail(&err);
                observer.on_status(STATUS_ERROR);
                Err(err)
            }
        };
        in_flight.settle();
        settled
    }

    /// [`select`](Self::select) then [`submit`](Self::submit).
    pub async fn compress(
        &self,
        file: MediaFile,
        request: CompressionRequest,
        observer: &dyn JobObserver,
    ) -> Result<CompressionResult, AppError> {
        self.select(file)?;
        self.submit(request, observer).await
    }

    /// Return to Idle, clearing file, result, error, progress and status. Ignored while a
    /// job is Processing (the engine call cannot be interrupted); returns whether it applied.
    pub fn reset(&self) -> bool {
        let mut job = self.job.lock();
        if job.state == JobState::Processing {
            log::warn!(
                target: "fit_size::orchestrator",
                "Reset ignored while a job is processing"
            );
            return false;
        }
        *job = Job::idle();
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let job = self.job.lock();
        JobSnapshot {
            state: job.state,
            progress: job.progress,
            status: job.status.clone(),
            error: job.error.clone(),
            file_name: job.file.as_ref().map(|f| f.name().to_string()),
            original_size: job.file.as_ref().map(MediaFile::size),
            compressed_size: job.result.as_ref().map(|r| r.compressed_size),
            result: job.result.clone(),
        }
    }

    pub fn state(&self) -> JobState {
        self.job.lock().state
    }

    /// Past successful jobs, newest first.
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history.lock().records()
    }

    fn begin(&self, request: &CompressionRequest) -> Result<(MediaFile, &'static str), AppError> {
        let mut job = self.job.lock();
        match job.state {
            JobState::Idle => {}
            JobState::Processing => return Err(AppError::Busy),
            JobState::Completed | JobState::Failed => {
                return Err(AppError::InvalidState(
                    "Reset the finished job before starting a new one".to_string(),
                ));
            }
        }
        let file = job
            .file
            .clone()
            .ok_or_else(|| AppError::validation("No file selected"))?;
        let initial_status = match file.kind() {
            MediaKind::Video => STATUS_COMPRESSING_VIDEO,
            MediaKind::Image => STATUS_COMPRESSING_IMAGE,
            MediaKind::Other => {
                return Err(AppError::validation(format!(
                    "Unsupported file type: {}",
                    if file.mime().is_empty() { "unknown" } else { file.mime() }
                )));
            }
        };
        request.validate()?;

        job.state = JobState::Processing;
        job.progress = 0.0;
        job.status = initial_status.to_string();
        job.error = None;
        job.result = None;
        Ok((file, initial_status))
    }

    fn relay(&self, event: EngineEvent, observer: &dyn JobObserver) {
        match event {
            EngineEvent::Progress(fraction) => {
                if !fraction.is_finite() {
                    return;
                }
                let percent = (fraction * 100.0).clamp(0.0, 100.0);
                let advanced = {
                    let mut job = self.job.lock();
                    if percent > job.progress {
                        job.progress = percent;
                        true
                    } else {
                        false
                    }
                };
                if advanced {
                    observer.on_progress(percent);
                }
            }
            EngineEvent::Status(label) => {
                self.job.lock().status = label.clone();
                observer.on_status(&label);
            }
        }
    }

    /// The history record lands before the state flips, so a Completed snapshot always has it.
    fn complete(&self, file: &MediaFile, result: &CompressionResult) {
        let record = self
            .history
            .lock()
            .record(file.name(), file.size(), result.compressed_size);
        {
            let mut job = self.job.lock();
            job.state = JobState::Completed;
            job.progress = 100.0;
            job.status = STATUS_DONE.to_string();
            job.error = None;
            job.result = Some(result.clone());
        }
        log::info!(
            target: "fit_size::orchestrator",
            "Job completed: {} {} -> {} bytes ({:.1}% smaller), history id {}",
            file.name(),
            file.size(),
            result.compressed_size,
            result.reduction_percent(file.size()),
            record.id
        );
    }

    fn fail(&self, err: &AppError) {
        let message = err.user_message();
        log::error!(
            target: "fit_size::orchestrator",
            "Job failed: {} ({:?})",
            message,
            err
        );
        let mut job = self.job.lock();
        job.state = JobState::Failed;
        job.status = STATUS_ERROR.to_string();
        job.error = Some(message);
        job.result = None;
    }
}

fn run_pipeline(
    engine: &dyn CodecEngine,
    file: &MediaFile,
    request: &CompressionRequest,
    events: &EngineEvents,
) -> Result<CompressionResult, AppError> {
    let bytes = match file.kind() {
        MediaKind::Video => {
            events.status(STATUS_READING_VIDEO_INFO);
            let info = engine.probe(file)?;
            if !info.duration_seconds.is_finite() || info.duration_seconds <= 0.0 {
                return Err(AppError::probe(format!(
                    "invalid duration ({})",
                    info.duration_seconds
                )));
            }
            if info.width == 0 || info.height == 0 {
                return Err(AppError::probe(format!(
                    "invalid dimensions ({}x{})",
                    info.width, info.height
                )));
            }
            let plan = EncodePlan::build(
                request.target_size_mb,
                info.duration_seconds,
                info.width,
                info.height,
                request.preserve_resolution,
            );
            log::debug!(
                target: "fit_size::orchestrator",
                "Encode plan for {}: {:?}",
                file.name(),
                plan
            );
            events.status(STATUS_COMPRESSING_VIDEO);
            engine.transcode_video(file, &plan, events)?
        }
        MediaKind::Image => {
            let params = ImageParams::from_request(request);
            log::debug!(
                target: "fit_size::orchestrator",
                "Image params for {}: {:?}",
                file.name(),
                params
            );
            engine.compress_image(file, &params, events)?
        }
        MediaKind::Other => {
            return Err(AppError::validation(format!(
                "Unsupported file type: {}",
                file.mime()
            )));
        }
    };
    Ok(CompressionResult::new(bytes, file.name()))
}
