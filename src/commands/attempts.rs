//! Attempt commands
//!
//! Record an attempt, save it with the self-reported score, and read saved
//! attempts back.

use crate::recorder::{ActiveCapture, RecordingOutcome, RecordingSession};
use crate::store::{bundle, Attempt, AttemptStore, AttemptSummary, TestType};
use crate::utils::error::{AppError, ErrorResponse};
use std::path::{Path, PathBuf};

/// Acquire the camera and start capturing with the session's configuration
pub async fn start_attempt(session: &mut RecordingSession) -> Result<ActiveCapture, ErrorResponse> {
    let constraints = session.config().constraints.clone();
    let max_duration_ms = session.config().max_duration_ms;

    let camera = session.acquire_camera(&constraints).await?;
    match session.start_capture(camera, max_duration_ms) {
        Ok(capture) => {
            tracing::info!("Attempt recording started (limit {}ms)", max_duration_ms);
            Ok(capture)
        }
        Err(e) => {
            session.release_camera();
            Err(e.into())
        }
    }
}

/// Wait for the capture to end and save it.
///
/// A cancelled capture stores nothing and yields `None`.
pub async fn finish_attempt(
    capture: ActiveCapture,
    store: &AttemptStore,
    test_type: TestType,
    score_text: &str,
) -> Result<Option<Attempt>, ErrorResponse> {
    let clip = match capture.await_result().await? {
        RecordingOutcome::Completed(clip) => clip,
        RecordingOutcome::Cancelled { duration_ms } => {
            tracing::info!("Attempt cancelled after {}ms, nothing saved", duration_ms);
            return Ok(None);
        }
    };

    let attempt = store.save(test_type, score_text, clip).await?;
    tracing::info!(
        "Saved {} attempt {} ({}, {} bytes)",
        attempt.test_type,
        attempt.id,
        attempt.score_text,
        attempt.video_len()
    );

    Ok(Some(attempt))
}

pub async fn get_attempt(store: &AttemptStore, id: &str) -> Result<Option<Attempt>, ErrorResponse> {
    Ok(store.get(id).await?)
}

/// Saved attempts without their videos, oldest first
pub async fn list_attempts(store: &AttemptStore) -> Result<Vec<AttemptSummary>, ErrorResponse> {
    Ok(store.list_summaries().await?)
}

/// Export one attempt as a review bundle under `dir`
pub async fn export_attempt(
    store: &AttemptStore,
    id: &str,
    dir: &Path,
) -> Result<PathBuf, ErrorResponse> {
    let attempt = store.get(id).await?.ok_or_else(|| ErrorResponse {
        code: "NOT_FOUND".to_string(),
        message: format!("No attempt with id {id}"),
    })?;

    tracing::info!("Exporting attempt {} to: {:?}", id, dir);

    let dir = dir.to_path_buf();
    let bundle_path = tokio::task::spawn_blocking(move || bundle::export_attempt(&attempt, &dir))
        .await
        .map_err(|e| ErrorResponse {
            code: "INTERNAL_ERROR".to_string(),
            message: e.to_string(),
        })?
        .map_err(AppError::from)?;

    Ok(bundle_path)
}

/// Read a review bundle produced by [`export_attempt`]
pub fn open_bundle(path: &Path) -> Result<Attempt, ErrorResponse> {
    Ok(bundle::read_bundle(path).map_err(AppError::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureBackend, SyntheticCamera, SyntheticConfig};
    use crate::recorder::SessionState;
    use crate::store::StoreConfig;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn session(config: SyntheticConfig) -> RecordingSession {
        let backend: Arc<dyn CaptureBackend> = Arc::new(SyntheticCamera::new(config));
        RecordingSession::new(backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_and_save() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));
        let mut session = session(SyntheticConfig::default());

        let capture = start_attempt(&mut session).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        capture.request_stop();

        let saved = finish_attempt(capture, &store, TestType::Pushup, "24 reps")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::Completed);

        let listed = list_attempts(&store).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, saved.id);
        assert_eq!(listed[0].video_bytes, saved.video_len());

        let loaded = get_attempt(&store, &saved.id).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_denied_camera_maps_to_code() {
        let mut session = session(SyntheticConfig {
            available: false,
            ..Default::default()
        });

        let err = start_attempt(&mut session).await.err().unwrap();
        assert_eq!(err.code, "DEVICE_UNAVAILABLE");
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_score_not_saved() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));
        let mut session = session(SyntheticConfig::default());

        let capture = start_attempt(&mut session).await.unwrap();
        capture.request_stop();

        let err = finish_attempt(capture, &store, TestType::Plank, " ")
            .await
            .unwrap_err();
        assert_eq!(err.code, "INVALID_ATTEMPT");
        assert!(list_attempts(&store).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_and_open_bundle() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path().join("db")));
        let mut session = session(SyntheticConfig::default());

        let capture = start_attempt(&mut session).await.unwrap();
        capture.request_stop();
        let saved = finish_attempt(capture, &store, TestType::Vjump, "48cm")
            .await
            .unwrap()
            .unwrap();

        let bundle_path = export_attempt(&store, &saved.id, &dir.path().join("review"))
            .await
            .unwrap();
        assert_eq!(open_bundle(&bundle_path).unwrap(), saved);

        let missing = export_attempt(&store, "nope", dir.path()).await.unwrap_err();
        assert_eq!(missing.code, "NOT_FOUND");
    }
}
