mod support;

use std::sync::Arc;

use fit_size_core::error::AppError;
use fit_size_core::history::HISTORY_CAPACITY;
use fit_size_core::media::{CompressionRequest, MediaFile};
use fit_size_core::orchestrator::{JobState, Orchestrator, STATUS_DONE, STATUS_ERROR};
use fit_size_core::plan::plan_video_bitrate;
use fit_size_core::presets::CompressionSettings;
use support::{RecordingObserver, ScriptedEngine, gate, image_file, video_file};

#[tokio::test]
async fn sixty_second_video_at_etsy_budget_completes() {
    let engine = Arc::new(ScriptedEngine::succeeding(60.0, 1920, 1080, 12_000_000));
    let orch = Orchestrator::new(engine.clone());
    let observer = RecordingObserver::default();

    let mut settings = CompressionSettings::default();
    settings.select_preset("Etsy").expect("preset");
    let request = settings.to_request();
    assert_eq!(request.target_size_mb, 19.5);
    assert!(request.preserve_resolution);

    let result = orch
        .compress(video_file("holiday.mov", 48_000_000), request, &observer)
        .await
        .expect("compress");

    let expected = ((19.5_f64 * 1024.0 * 1024.0 * 8.0 - 128_000.0 * 60.0) / 60.0 * 0.95).floor() as u64;
    let plan = engine.plans.lock()[0];
    assert_eq!(plan.video_bitrate_bps, expected);
    assert_eq!(plan.video_bitrate_bps, plan_video_bitrate(19.5, 60.0));
    assert!(plan.video_bitrate_bps >= 100_000);
    assert_eq!(plan.audio_bitrate_bps, 128_000);
    assert_eq!(plan.scale, None);

    assert_eq!(result.compressed_size, 12_000_000);
    assert_eq!(result.file_name, "compressed_holiday.mov");
    assert!((result.reduction_percent(48_000_000) - 75.0).abs() < 1e-9);

    let snap = orch.snapshot();
    assert_eq!(snap.state, JobState::Completed);
    assert_eq!(snap.progress, 100.0);
    assert_eq!(snap.status, STATUS_DONE);

    let history = orch.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].file_name, "holiday.mov");
    assert_eq!(history[0].original_size, 48_000_000);
    assert_eq!(history[0].compressed_size, 12_000_000);

    let progress = observer.progress.lock().clone();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    assert!(progress.iter().all(|p| (0.0..=100.0).contains(p)));
    assert_eq!(engine.live.count(), 0);
}

#[tokio::test]
async fn unsupported_kind_is_validation_error_and_stays_idle() {
    let engine = Arc::new(ScriptedEngine::succeeding(10.0, 640, 480, 10));
    let orch = Orchestrator::new(engine.clone());
    let file = MediaFile::new("notes.txt", "text/plain", b"hello".to_vec());

    let err = orch
        .compress(file, CompressionRequest::new(19.5, true), &())
        .await
        .expect_err("should reject");

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(orch.state(), JobState::Idle);
    assert!(orch.history().is_empty());
    assert!(engine.plans.lock().is_empty());
}

#[tokio::test]
async fn engine_failure_fails_job_and_releases_buffers() {
    let engine = Arc::new(ScriptedEngine::failing(1));
    let orch = Orchestrator::new(engine.clone());
    let observer = RecordingObserver::default();

    let err = orch
        .compress(video_file("clip.mp4", 1024), CompressionRequest::new(8.0, true), &observer)
        .await
        .expect_err("should fail");

    assert!(matches!(err, AppError::EngineFailed { code: 1, .. }));
    let snap = orch.snapshot();
    assert_eq!(snap.state, JobState::Failed);
    assert_eq!(snap.status, STATUS_ERROR);
    assert!(snap.error.as_deref().is_some_and(|e| !e.trim().is_empty()));
    assert!(snap.result.is_none());
    assert!(orch.history().is_empty());
    assert_eq!(engine.live.count(), 0);
    assert_eq!(observer.statuses.lock().last().map(String::as_str), Some(STATUS_ERROR));
}

#[tokio::test]
async fn probe_failure_fails_before_planning() {
    let engine = Arc::new(ScriptedEngine::new(support::Script::ProbeFails));
    let orch = Orchestrator::new(engine.clone());

    let err = orch
        .compress(video_file("broken.mp4", 64), CompressionRequest::new(8.0, true), &())
        .await
        .expect_err("should fail");

    assert!(matches!(err, AppError::Probe(_)));
    assert!(engine.plans.lock().is_empty());
    assert_eq!(orch.state(), JobState::Failed);
    assert_eq!(engine.live.count(), 0);
}

#[tokio::test]
async fn history_keeps_ten_most_recent_jobs() {
    let orch = Orchestrator::new(Arc::new(ScriptedEngine::succeeding(5.0, 320, 240, 100)));
    for i in 0..11 {
        let name = format!("photo{}.jpg", i);
        orch.compress(image_file(&name, 1000), CompressionRequest::new(1.0, false), &())
            .await
            .expect("compress");
        assert!(orch.reset());
    }
    let history = orch.history();
    assert_eq!(history.len(), HISTORY_CAPACITY);
    assert_eq!(history[0].file_name, "photo10.jpg");
    assert_eq!(history[9].file_name, "photo1.jpg");
    assert!(history.windows(2).all(|w| w[0].id > w[1].id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_and_resubmit_are_refused_while_processing() {
    let (gate, handle) = gate();
    let engine = Arc::new(ScriptedEngine::succeeding(10.0, 640, 480, 10).with_gate(gate));
    let orch = Arc::new(Orchestrator::new(engine.clone()));

    let running = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move {
            orch.compress(video_file("long.mp4", 100), CompressionRequest::new(5.0, true), &())
                .await
        })
    };

    handle.entered.recv().expect("engine entered");
    assert_eq!(orch.state(), JobState::Processing);
    assert!(!orch.reset());
    assert_eq!(orch.state(), JobState::Processing);
    assert!(matches!(orch.select(video_file("other.mp4", 10)), Err(AppError::Busy)));
    let second = orch.submit(CompressionRequest::new(5.0, true), &()).await;
    assert!(matches!(second, Err(AppError::Busy)));

    handle.release.send(()).expect("release engine");
    let result = running.await.expect("join").expect("compress");
    assert_eq!(result.compressed_size, 10);
    assert_eq!(orch.state(), JobState::Completed);
    assert_eq!(orch.history().len(), 1);
    assert_eq!(engine.live.count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_job_fails_and_orchestrator_stays_usable() {
    let (gate, handle) = gate();
    let engine = Arc::new(ScriptedEngine::succeeding(10.0, 640, 480, 10).with_gate(gate));
    let orch = Arc::new(Orchestrator::new(engine.clone()));

    let running = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move {
            orch.compress(video_file("long.mp4", 100), CompressionRequest::new(5.0, true), &())
                .await
        })
    };

    handle.entered.recv().expect("engine entered");
    running.abort();
    assert!(running.await.expect_err("aborted").is_cancelled());

    let snap = orch.snapshot();
    assert_eq!(snap.state, JobState::Failed);
    assert_eq!(snap.status, STATUS_ERROR);
    assert!(snap.error.is_some_and(|e| !e.is_empty()));
    assert!(orch.history().is_empty());

    // One release for the abandoned engine call, one for the next job.
    handle.release.send(()).expect("release abandoned call");
    handle.release.send(()).expect("release next job");
    assert!(orch.reset());
    let result = orch
        .compress(video_file("again.mp4", 100), CompressionRequest::new(5.0, true), &())
        .await
        .expect("compress after drop");
    assert_eq!(result.compressed_size, 10);
    assert_eq!(orch.state(), JobState::Completed);
    assert_eq!(orch.history().len(), 1);
}

#[tokio::test]
async fn image_path_passes_unbounded_dimension_only_when_preserving() {
    let engine = Arc::new(ScriptedEngine::succeeding(1.0, 1, 1, 10));
    let orch = Orchestrator::new(engine.clone());

    orch.compress(image_file("a.jpg", 100), CompressionRequest::new(2.0, true), &())
        .await
        .expect("compress");
    orch.reset();
    orch.compress(image_file("b.jpg", 100), CompressionRequest::new(2.0, false), &())
        .await
        .expect("compress");

    let params = engine.image_params.lock().clone();
    assert_eq!(params[0].max_dimension, 10_000);
    assert_eq!(params[1].max_dimension, 1920);
    assert!(params.iter().all(|p| p.target_size_mb == 2.0));
}
