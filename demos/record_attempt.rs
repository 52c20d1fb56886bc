//! Record two attempts with the software camera: one saved, one cancelled.
//!
//! Run with `cargo run --example record_attempt`. Set FITCHECK_STORE_PATH to
//! keep the database; otherwise it lives in a temp directory.

use anyhow::{Context, Result};
use fitcheck::capture::{CaptureBackend, SyntheticCamera, SyntheticConfig};
use fitcheck::commands::attempts::{finish_attempt, list_attempts, start_attempt};
use fitcheck::config::ENV_STORE_PATH;
use fitcheck::{AppConfig, AttemptStore, RecordingSession, TestType};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    fitcheck::init_tracing();

    let scratch = tempfile::tempdir()?;
    let mut config = AppConfig::load(Path::new("fitcheck.json"))?;
    if std::env::var(ENV_STORE_PATH).is_err() {
        config.store.path = scratch.path().to_path_buf();
    }
    config.recording.max_duration_ms = 3_000;

    let store = AttemptStore::open(config.store.clone()).await?;
    let backend: Arc<dyn CaptureBackend> = Arc::new(SyntheticCamera::new(SyntheticConfig::default()));

    // First attempt runs until the auto-stop timer fires
    let mut session = RecordingSession::with_config(backend.clone(), config.recording.clone());
    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  event: {:?}", event);
        }
    });

    println!("Recording push-ups until auto-stop...");
    let capture = start_attempt(&mut session).await?;
    let saved = finish_attempt(capture, &store, TestType::Pushup, "24 reps")
        .await?
        .context("auto-stopped attempt was not saved")?;
    println!(
        "Saved {} ({} ms, {} bytes, {})",
        saved.id,
        saved.duration_ms,
        saved.video_len(),
        saved.mime_type
    );

    // Second attempt is cancelled halfway
    let mut session = RecordingSession::with_config(backend, config.recording.clone());
    println!("Recording a plank, then cancelling...");
    let capture = start_attempt(&mut session).await?;
    let control = capture.control();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        control.request_cancel();
    });
    let cancelled = finish_attempt(capture, &store, TestType::Plank, "62s").await?;
    println!("Cancelled attempt saved: {}", cancelled.is_some());

    let attempts = list_attempts(&store).await?;
    println!("{} attempt(s) in {}", attempts.len(), config.store.database_path().display());
    for attempt in attempts {
        println!(
            "  {} {:<8} {:>8} verified={}",
            attempt.created_at.format("%H:%M:%S"),
            attempt.test_type,
            attempt.score_text,
            attempt.verified
        );
    }

    Ok(())
}
