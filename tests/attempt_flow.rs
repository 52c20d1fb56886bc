//! End-to-end: record with the software camera, save, list, reopen.

use fitcheck::capture::synthetic::SyntheticStats;
use fitcheck::capture::{CaptureBackend, SyntheticCamera, SyntheticConfig};
use fitcheck::commands::attempts::{finish_attempt, list_attempts, start_attempt};
use fitcheck::recorder::{RecordingConfig, StopReason};
use fitcheck::{AttemptStore, RecordingSession, SessionState, StoreConfig, TestType};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn camera() -> (Arc<dyn CaptureBackend>, Arc<SyntheticStats>) {
    let camera = SyntheticCamera::new(SyntheticConfig::default());
    let stats = camera.stats();
    (Arc::new(camera), stats)
}

fn session(backend: Arc<dyn CaptureBackend>, max_duration_ms: u64) -> RecordingSession {
    RecordingSession::with_config(
        backend,
        RecordingConfig {
            max_duration_ms,
            ..Default::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn auto_stopped_plank_is_saved_and_survives_reopen() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::in_dir(dir.path());
    let store = AttemptStore::new(config.clone());
    let (backend, stats) = camera();

    let mut session = session(backend, 62_000);
    let capture = start_attempt(&mut session).await.unwrap();
    let saved = finish_attempt(capture, &store, TestType::Plank, "62s")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(session.state(), SessionState::Completed);
    assert!(saved.duration_ms >= 62_000);
    assert!(saved.video_len() > 0);
    assert!(!saved.verified);
    assert_eq!(saved.mime_type, "video/webm;codecs=vp8,opus");

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.acquisitions, 1);
    assert_eq!(snapshot.stop_signals, 1);
    assert_eq!(snapshot.track_stops, 1);

    drop(store);
    let reopened = AttemptStore::open(config).await.unwrap();
    let loaded = reopened.get(&saved.id).await.unwrap().unwrap();
    assert_eq!(loaded, saved);
}

#[tokio::test(start_paused = true)]
async fn cancelled_attempt_stores_nothing() {
    let dir = tempdir().unwrap();
    let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));
    let (backend, stats) = camera();

    let mut session = session(backend, 90_000);
    let capture = start_attempt(&mut session).await.unwrap();
    let control = capture.control();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(control.request_cancel());

    let result = finish_attempt(capture, &store, TestType::Squat, "30 reps")
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(session.state(), SessionState::Cancelled);
    assert!(list_attempts(&store).await.unwrap().is_empty());
    assert_eq!(stats.snapshot().track_stops, 1);
}

#[tokio::test(start_paused = true)]
async fn attempts_listed_in_recording_order() {
    let dir = tempdir().unwrap();
    let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));
    let (backend, _stats) = camera();

    let mut ids = Vec::new();
    for (test_type, score) in [
        (TestType::Pushup, "24 reps"),
        (TestType::Vjump, "48cm"),
        (TestType::Sprint, "7.9s"),
    ] {
        let mut session = session(backend.clone(), 90_000);
        let capture = start_attempt(&mut session).await.unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;
        capture.request_stop();

        let saved = finish_attempt(capture, &store, test_type, score)
            .await
            .unwrap()
            .unwrap();
        ids.push(saved.id);
    }

    let listed = list_attempts(&store).await.unwrap();
    let listed_ids: Vec<String> = listed.iter().map(|a| a.id.clone()).collect();
    assert_eq!(listed_ids, ids);
    assert_eq!(listed[1].score_text, "48cm");
}

#[tokio::test(start_paused = true)]
async fn manual_stop_reports_reason() {
    let (backend, _stats) = camera();
    let mut session = session(backend, 90_000);

    let capture = start_attempt(&mut session).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    capture.request_stop();

    let clip = capture.await_result().await.unwrap().into_clip().unwrap();
    assert_eq!(clip.stop_reason, StopReason::Manual);
    assert!(clip.duration_ms >= 5_000);
}
