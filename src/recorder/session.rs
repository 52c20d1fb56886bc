//! Recording session
//!
//! A session owns one camera acquisition and at most one capture pass. Three
//! sources can end a capture: the auto-stop timer, a manual stop and a cancel.
//! Only the first of them signals the encoder; whether the outcome counts as
//! cancelled is read from the cancel flag when the encoder confirms the stop.
//! The camera is released on that confirmation, whatever the classification.

use super::error::{RecordingError, RecordingResult};
use super::state::{RecordedClip, RecordingConfig, RecordingOutcome, SessionState, StopReason};
use crate::capture::{
    select_codec, CameraConstraints, CameraInfo, CaptureBackend, Encoder, EncoderEvent,
    EncoderState, MediaStream, PLATFORM_DEFAULT_CODEC,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Events emitted during a session
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    /// Camera acquired
    CameraAcquired(CameraInfo),
    /// Capture started with the given container
    Started { mime_type: String },
    /// Stop signalled, waiting for the hardware
    Stopping(StopReason),
    /// Camera tracks stopped
    CameraReleased,
    /// Clip produced
    Completed { duration_ms: u64, bytes: usize },
    /// Session cancelled
    Cancelled,
    /// Capture failed
    Failed(String),
}

/// Proof that a camera is held by a particular session.
///
/// Consumed by [`RecordingSession::start_capture`]; a handle from an earlier
/// acquisition or another session is rejected.
#[must_use]
#[derive(Debug)]
pub struct CameraHandle {
    session_id: Uuid,
    generation: u64,
    info: CameraInfo,
}

impl CameraHandle {
    pub fn info(&self) -> &CameraInfo {
        &self.info
    }
}

struct Capture {
    encoder: Box<dyn Encoder>,
    mime_type: String,
    started_at: Instant,
    auto_stop: JoinHandle<()>,
}

enum Phase {
    Idle,
    CameraActive,
    Recording(Capture),
    StoppingNormal(Capture),
    StoppingCancelled(Capture),
    Completed,
    Cancelled,
    Failed,
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::CameraActive => SessionState::CameraActive,
            Phase::Recording(_) => SessionState::Recording,
            Phase::StoppingNormal(_) => SessionState::StoppingNormal,
            Phase::StoppingCancelled(_) => SessionState::StoppingCancelled,
            Phase::Completed => SessionState::Completed,
            Phase::Cancelled => SessionState::Cancelled,
            Phase::Failed => SessionState::Failed,
        }
    }

    fn capture(&self) -> Option<&Capture> {
        match self {
            Phase::Recording(c) | Phase::StoppingNormal(c) | Phase::StoppingCancelled(c) => Some(c),
            _ => None,
        }
    }
}

struct Inner {
    phase: Phase,
    camera: Option<Arc<dyn MediaStream>>,
    generation: u64,
    cancel_requested: bool,
    stop_reason: Option<StopReason>,
    failure: Option<String>,
}

/// State shared between the session, its capture controls, the auto-stop
/// timer and the encoder event collector.
struct Shared {
    session_id: Uuid,
    inner: Mutex<Inner>,
    events: broadcast::Sender<RecordingEvent>,
}

impl Shared {
    fn state(&self) -> SessionState {
        self.inner.lock().phase.state()
    }

    fn emit(&self, event: RecordingEvent) {
        let _ = self.events.send(event);
    }

    fn release_locked(&self, inner: &mut Inner) -> bool {
        match inner.camera.take() {
            Some(stream) => {
                stream.stop_tracks();
                tracing::info!(session = %self.session_id, "Released camera {}", stream.info().id);
                self.emit(RecordingEvent::CameraReleased);
                true
            }
            None => false,
        }
    }

    fn request_stop(&self, reason: StopReason) -> bool {
        let mut inner = self.inner.lock();
        self.signal_stop_locked(&mut inner, reason)
    }

    /// Move Recording -> Stopping and signal the encoder. First caller wins.
    fn signal_stop_locked(&self, inner: &mut Inner, reason: StopReason) -> bool {
        let capture = match std::mem::replace(&mut inner.phase, Phase::Idle) {
            Phase::Recording(capture) => capture,
            other => {
                let state = other.state();
                inner.phase = other;
                tracing::debug!(session = %self.session_id, "Ignoring {:?} stop while {:?}", reason, state);
                return false;
            }
        };

        // The encoder may already have stopped on its own
        if capture.encoder.state() == EncoderState::Recording {
            capture.encoder.stop();
        } else {
            tracing::debug!(session = %self.session_id, "Encoder already stopped, not signalling");
        }

        inner.stop_reason = Some(reason);
        inner.phase = if inner.cancel_requested {
            Phase::StoppingCancelled(capture)
        } else {
            Phase::StoppingNormal(capture)
        };

        tracing::info!(session = %self.session_id, "Stopping capture ({:?})", reason);
        self.emit(RecordingEvent::Stopping(reason));
        true
    }

    fn request_cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.phase, Phase::Idle) {
            Phase::Recording(capture) => {
                inner.phase = Phase::Recording(capture);
                inner.cancel_requested = true;
                self.signal_stop_locked(&mut inner, StopReason::Cancelled)
            }
            Phase::StoppingNormal(capture) => {
                // Stop already in flight; only the classification changes
                inner.cancel_requested = true;
                inner.phase = Phase::StoppingCancelled(capture);
                tracing::info!(session = %self.session_id, "Cancel requested while stopping");
                true
            }
            Phase::CameraActive => {
                inner.cancel_requested = true;
                self.release_locked(&mut inner);
                inner.phase = Phase::Cancelled;
                tracing::info!(session = %self.session_id, "Session cancelled before capture");
                self.emit(RecordingEvent::Cancelled);
                true
            }
            other => {
                inner.phase = other;
                false
            }
        }
    }

    fn record_failure(&self, message: String) {
        let mut inner = self.inner.lock();
        tracing::error!(session = %self.session_id, "Encoder error: {}", message);
        if inner.failure.is_none() {
            inner.failure = Some(message);
        }
        self.signal_stop_locked(&mut inner, StopReason::Error);
    }

    /// Hardware confirmed the stop: classify, release, resolve.
    fn finish(&self, data: Vec<u8>) -> RecordingResult<RecordingOutcome> {
        let mut inner = self.inner.lock();
        let capture = match std::mem::replace(&mut inner.phase, Phase::Idle) {
            Phase::Recording(capture) => {
                inner.stop_reason.get_or_insert(StopReason::Device);
                capture
            }
            Phase::StoppingNormal(capture) | Phase::StoppingCancelled(capture) => capture,
            other => {
                let from = other.state();
                inner.phase = other;
                return Err(RecordingError::InvalidTransition {
                    from,
                    operation: "confirm stop",
                });
            }
        };

        capture.auto_stop.abort();
        let duration_ms = capture.started_at.elapsed().as_millis() as u64;
        self.release_locked(&mut inner);

        if inner.cancel_requested {
            inner.phase = Phase::Cancelled;
            tracing::info!(
                session = %self.session_id,
                "Capture cancelled after {}ms, discarding {} bytes",
                duration_ms,
                data.len()
            );
            self.emit(RecordingEvent::Cancelled);
            return Ok(RecordingOutcome::Cancelled { duration_ms });
        }

        if let Some(message) = inner.failure.clone() {
            inner.phase = Phase::Failed;
            self.emit(RecordingEvent::Failed(message.clone()));
            return Err(RecordingError::CaptureFailed(message));
        }

        let stop_reason = inner.stop_reason.unwrap_or(StopReason::Device);
        inner.phase = Phase::Completed;
        tracing::info!(
            session = %self.session_id,
            "Capture completed: {}ms, {} bytes of {}",
            duration_ms,
            data.len(),
            capture.mime_type
        );
        self.emit(RecordingEvent::Completed {
            duration_ms,
            bytes: data.len(),
        });

        Ok(RecordingOutcome::Completed(RecordedClip {
            data,
            mime_type: capture.mime_type,
            duration_ms,
            stop_reason,
            completed_at: Utc::now(),
        }))
    }
}

/// Drain encoder events until the hardware confirms the stop
async fn collect(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<EncoderEvent>,
    result: oneshot::Sender<RecordingResult<RecordingOutcome>>,
) {
    let mut data = Vec::new();
    let mut chunks = 0usize;

    loop {
        match events.recv().await {
            Some(EncoderEvent::Chunk(chunk)) => {
                if !chunk.is_empty() {
                    chunks += 1;
                    data.extend_from_slice(&chunk);
                }
            }
            Some(EncoderEvent::Error(message)) => shared.record_failure(message),
            Some(EncoderEvent::Stopped) => break,
            None => {
                shared.record_failure("encoder closed without confirming stop".to_string());
                break;
            }
        }
    }

    tracing::debug!(session = %shared.session_id, "Encoder confirmed stop after {} chunks", chunks);

    if result.send(shared.finish(data)).is_err() {
        tracing::debug!(session = %shared.session_id, "Capture result was not awaited");
    }
}

/// Coordinates one camera acquisition and one capture pass
pub struct RecordingSession {
    backend: Arc<dyn CaptureBackend>,
    config: RecordingConfig,
    shared: Arc<Shared>,
}

impl RecordingSession {
    /// Create an idle session with default configuration
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self::with_config(backend, RecordingConfig::default())
    }

    /// Create an idle session
    pub fn with_config(backend: Arc<dyn CaptureBackend>, config: RecordingConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            backend,
            config,
            shared: Arc::new(Shared {
                session_id: Uuid::new_v4(),
                inner: Mutex::new(Inner {
                    phase: Phase::Idle,
                    camera: None,
                    generation: 0,
                    cancel_requested: false,
                    stop_reason: None,
                    failure: None,
                }),
                events,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.shared.events.subscribe()
    }

    /// Acquire a camera.
    ///
    /// A camera already held by this session is released first. On failure the
    /// session stays Idle and nothing is retried.
    pub async fn acquire_camera(
        &mut self,
        constraints: &CameraConstraints,
    ) -> RecordingResult<CameraHandle> {
        {
            let mut inner = self.shared.inner.lock();
            match inner.phase.state() {
                SessionState::Idle => {}
                SessionState::CameraActive => {
                    tracing::debug!(session = %self.shared.session_id, "Releasing previous camera before re-acquiring");
                    self.shared.release_locked(&mut inner);
                    inner.phase = Phase::Idle;
                }
                from => {
                    return Err(RecordingError::InvalidTransition {
                        from,
                        operation: "acquire camera",
                    })
                }
            }
        }

        let stream = match self.backend.acquire(constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(session = %self.shared.session_id, "Camera acquisition failed: {}", e);
                return Err(e.into());
            }
        };

        let info = stream.info().clone();
        let mut inner = self.shared.inner.lock();
        inner.camera = Some(stream);
        inner.generation += 1;
        inner.phase = Phase::CameraActive;

        tracing::info!(session = %self.shared.session_id, "Camera acquired: {} ({})", info.name, info.id);
        self.shared.emit(RecordingEvent::CameraAcquired(info.clone()));

        Ok(CameraHandle {
            session_id: self.shared.session_id,
            generation: inner.generation,
            info,
        })
    }

    /// Start capturing from the acquired camera.
    ///
    /// Returns at once; the capture stops on its own after `max_duration_ms`.
    /// Must be called from within a Tokio runtime.
    pub fn start_capture(
        &mut self,
        camera: CameraHandle,
        max_duration_ms: u64,
    ) -> RecordingResult<ActiveCapture> {
        let mut inner = self.shared.inner.lock();
        let from = inner.phase.state();
        let stale = camera.session_id != self.shared.session_id || camera.generation != inner.generation;
        let stream = match (&inner.camera, from, stale) {
            (Some(stream), SessionState::CameraActive, false) => stream.clone(),
            _ => {
                return Err(RecordingError::InvalidTransition {
                    from,
                    operation: "start capture",
                })
            }
        };

        let requested = select_codec(&self.config.codec_preferences, |codec| {
            self.backend.supports_codec(codec)
        });
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let encoder = self.backend.start_encoder(stream, requested, event_tx)?;

        // Report what the encoder actually uses, never what was asked for
        let mime_type = [encoder.mime_type(), self.backend.default_codec()]
            .into_iter()
            .find(|m| !m.is_empty())
            .unwrap_or(PLATFORM_DEFAULT_CODEC)
            .to_string();

        let auto_stop = {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(max_duration_ms)).await;
                if shared.request_stop(StopReason::AutoStop) {
                    tracing::info!(session = %shared.session_id, "Auto-stop after {}ms", max_duration_ms);
                }
            })
        };

        inner.phase = Phase::Recording(Capture {
            encoder,
            mime_type: mime_type.clone(),
            started_at: Instant::now(),
            auto_stop,
        });

        let (result_tx, result_rx) = oneshot::channel();
        tokio::spawn(collect(self.shared.clone(), event_rx, result_tx));

        tracing::info!(
            session = %self.shared.session_id,
            "Capture started: {} (requested {:?}), max {}ms",
            mime_type,
            requested,
            max_duration_ms
        );
        self.shared.emit(RecordingEvent::Started { mime_type });

        Ok(ActiveCapture {
            control: CaptureControl {
                shared: self.shared.clone(),
            },
            result: Some(result_rx),
            max_duration_ms,
        })
    }

    /// Stop the running capture. No-op unless Recording.
    pub fn request_stop(&self) -> bool {
        self.shared.request_stop(StopReason::Manual)
    }

    /// Cancel the running capture, or abandon an acquired camera.
    pub fn request_cancel(&self) -> bool {
        self.shared.request_cancel()
    }

    /// Release the camera without recording.
    ///
    /// A no-op when nothing is held. While a capture runs the camera is
    /// released by the stop confirmation instead.
    pub fn release_camera(&self) {
        let mut inner = self.shared.inner.lock();
        match inner.phase.state() {
            SessionState::CameraActive => {
                self.shared.release_locked(&mut inner);
                inner.phase = Phase::Idle;
            }
            SessionState::Recording
            | SessionState::StoppingNormal
            | SessionState::StoppingCancelled => {
                tracing::warn!(
                    session = %self.shared.session_id,
                    "Camera is released when the capture stops; ignoring release"
                );
            }
            _ => {
                self.shared.release_locked(&mut inner);
            }
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        if inner.phase.state() == SessionState::CameraActive {
            tracing::debug!(session = %self.shared.session_id, "Session dropped holding a camera");
            self.shared.release_locked(&mut inner);
            inner.phase = Phase::Idle;
        }
    }
}

/// Cloneable stop/cancel control for a running capture
#[derive(Clone)]
pub struct CaptureControl {
    shared: Arc<Shared>,
}

impl CaptureControl {
    /// Stop the capture. Returns false if it was already stopping or done.
    pub fn request_stop(&self) -> bool {
        self.shared.request_stop(StopReason::Manual)
    }

    /// Cancel the capture. Returns false if it already finished.
    pub fn request_cancel(&self) -> bool {
        self.shared.request_cancel()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Time since capture start, 0 once finished
    pub fn elapsed_ms(&self) -> u64 {
        self.shared
            .inner
            .lock()
            .phase
            .capture()
            .map(|c| c.started_at.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A running capture. Resolves exactly once through [`ActiveCapture::await_result`].
///
/// Dropping it before taking the result cancels the capture, so the camera is
/// released on the stop confirmation rather than at auto-stop.
pub struct ActiveCapture {
    control: CaptureControl,
    result: Option<oneshot::Receiver<RecordingResult<RecordingOutcome>>>,
    max_duration_ms: u64,
}

impl ActiveCapture {
    /// A control that other tasks can hold
    pub fn control(&self) -> CaptureControl {
        self.control.clone()
    }

    pub fn request_stop(&self) -> bool {
        self.control.request_stop()
    }

    pub fn request_cancel(&self) -> bool {
        self.control.request_cancel()
    }

    pub fn max_duration_ms(&self) -> u64 {
        self.max_duration_ms
    }

    /// Wait for the hardware to confirm the stop and take the outcome
    pub async fn await_result(mut self) -> RecordingResult<RecordingOutcome> {
        let received = match self.result.take() {
            Some(result) => result.await,
            None => {
                return Err(RecordingError::CaptureFailed(
                    "capture result already taken".to_string(),
                ))
            }
        };
        match received {
            Ok(outcome) => outcome,
            Err(_) => Err(RecordingError::CaptureFailed(
                "capture ended without a result".to_string(),
            )),
        }
    }
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        if self.result.is_some() && self.control.request_cancel() {
            tracing::debug!(
                session = %self.control.shared.session_id,
                "Capture dropped before its result was taken; cancelling"
            );
        }
    }
}
