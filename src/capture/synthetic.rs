//! Software camera backend
//!
//! Produces a deterministic byte stream instead of real video. Used by the
//! demo program and the test suite, and useful on machines without a webcam.
//! Device contention, permission denial, mid-capture faults and stop latency
//! are all configurable, and every device interaction is counted.

use super::codec::PLATFORM_DEFAULT_CODEC;
use super::traits::{
    CameraConstraints, CameraInfo, CaptureBackend, CaptureError, CaptureResult, Encoder,
    EncoderEvent, EncoderState, MediaStream, Resolution,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Behaviour of a [`SyntheticCamera`]
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// When false, every acquire fails as if permission was denied
    pub available: bool,

    /// Refuse a second acquire while a stream is still live
    pub exclusive: bool,

    /// Codecs the fake encoder claims to support
    pub supported_codecs: Vec<String>,

    /// Codec used when none is requested
    pub default_codec: String,

    /// Time between emitted chunks
    pub chunk_interval: Duration,

    /// Bytes per emitted chunk
    pub chunk_size: usize,

    /// Delay between a stop signal and the `Stopped` event
    pub stop_latency: Duration,

    /// Inject an encoder fault this long after start
    pub fail_after: Option<Duration>,

    /// Device stops on its own this long after start, as when unplugged
    pub device_stop_after: Option<Duration>,

    /// Encoder goes away this long after start without confirming the stop
    pub vanish_after: Option<Duration>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            available: true,
            exclusive: true,
            supported_codecs: vec![
                "video/webm;codecs=vp8,opus".to_string(),
                "video/webm".to_string(),
            ],
            default_codec: PLATFORM_DEFAULT_CODEC.to_string(),
            chunk_interval: Duration::from_millis(100),
            chunk_size: 4096,
            stop_latency: Duration::from_millis(20),
            fail_after: None,
            device_stop_after: None,
            vanish_after: None,
        }
    }
}

/// Device interaction counters
#[derive(Debug, Default)]
pub struct SyntheticStats {
    acquisitions: AtomicUsize,
    track_stops: AtomicUsize,
    encoders_started: AtomicUsize,
    stop_signals: AtomicUsize,
}

/// Point-in-time copy of [`SyntheticStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Successful camera acquisitions
    pub acquisitions: usize,
    /// Calls to `MediaStream::stop_tracks`
    pub track_stops: usize,
    /// Encoders started
    pub encoders_started: usize,
    /// Calls to `Encoder::stop`
    pub stop_signals: usize,
}

impl SyntheticStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            acquisitions: self.acquisitions.load(Ordering::SeqCst),
            track_stops: self.track_stops.load(Ordering::SeqCst),
            encoders_started: self.encoders_started.load(Ordering::SeqCst),
            stop_signals: self.stop_signals.load(Ordering::SeqCst),
        }
    }
}

/// Software camera + encoder
pub struct SyntheticCamera {
    config: SyntheticConfig,
    stats: Arc<SyntheticStats>,
    busy: Arc<AtomicBool>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            stats: Arc::new(SyntheticStats::default()),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared counters, still readable after the camera is handed to a session
    pub fn stats(&self) -> Arc<SyntheticStats> {
        self.stats.clone()
    }

    fn camera_info(constraints: &CameraConstraints) -> CameraInfo {
        CameraInfo {
            id: constraints
                .device_id
                .clone()
                .unwrap_or_else(|| "synthetic-0".to_string()),
            name: "Synthetic Camera".to_string(),
            supported_resolutions: vec![Resolution {
                width: 1280,
                height: 720,
            }],
        }
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[async_trait]
impl CaptureBackend for SyntheticCamera {
    async fn acquire(&self, constraints: &CameraConstraints) -> CaptureResult<Arc<dyn MediaStream>> {
        if !self.config.available {
            return Err(CaptureError::PermissionDenied(
                "synthetic camera disabled".to_string(),
            ));
        }

        if self.config.exclusive && self.busy.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::DeviceBusy(
                "synthetic camera already in use".to_string(),
            ));
        }
        self.busy.store(true, Ordering::SeqCst);
        self.stats.acquisitions.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(SyntheticStream {
            info: Self::camera_info(constraints),
            live: AtomicBool::new(true),
            busy: self.busy.clone(),
            stats: self.stats.clone(),
        }))
    }

    fn supports_codec(&self, mime_type: &str) -> bool {
        self.config.supported_codecs.iter().any(|c| c == mime_type)
    }

    fn default_codec(&self) -> &str {
        &self.config.default_codec
    }

    fn start_encoder(
        &self,
        stream: Arc<dyn MediaStream>,
        mime_type: Option<&str>,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> CaptureResult<Box<dyn Encoder>> {
        if !stream.is_live() {
            return Err(CaptureError::Encoder("stream has no live tracks".to_string()));
        }

        let mime_type = mime_type.unwrap_or(&self.config.default_codec).to_string();
        let state = Arc::new(Mutex::new(EncoderState::Recording));
        let stop = Arc::new(Notify::new());

        self.stats.encoders_started.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(run_encoder(
            self.config.clone(),
            stream,
            state.clone(),
            stop.clone(),
            events,
        ));

        Ok(Box::new(SyntheticEncoder {
            mime_type,
            state,
            stop,
            stats: self.stats.clone(),
        }))
    }
}

struct SyntheticStream {
    info: CameraInfo,
    live: AtomicBool,
    busy: Arc<AtomicBool>,
    stats: Arc<SyntheticStats>,
}

impl MediaStream for SyntheticStream {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn stop_tracks(&self) {
        self.stats.track_stops.fetch_add(1, Ordering::SeqCst);
        if self.live.swap(false, Ordering::SeqCst) {
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

struct SyntheticEncoder {
    mime_type: String,
    state: Arc<Mutex<EncoderState>>,
    stop: Arc<Notify>,
    stats: Arc<SyntheticStats>,
}

impl Encoder for SyntheticEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn state(&self) -> EncoderState {
        *self.state.lock()
    }

    fn stop(&self) {
        self.stats.stop_signals.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if *state == EncoderState::Recording {
            *state = EncoderState::Stopped;
            self.stop.notify_one();
        }
    }
}

/// Resolves after `delay`, or never
async fn after(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending::<()>().await,
    }
}

async fn run_encoder(
    config: SyntheticConfig,
    stream: Arc<dyn MediaStream>,
    state: Arc<Mutex<EncoderState>>,
    stop: Arc<Notify>,
    events: mpsc::UnboundedSender<EncoderEvent>,
) {
    let mut ticker = tokio::time::interval(config.chunk_interval);
    // First tick completes immediately
    ticker.tick().await;

    let fault = after(config.fail_after);
    let device_stop = after(config.device_stop_after);
    let vanish = after(config.vanish_after);
    tokio::pin!(fault, device_stop, vanish);

    let mut sequence: u8 = 0;
    loop {
        tokio::select! {
            _ = stop.notified() => break,
            _ = &mut fault => {
                *state.lock() = EncoderState::Stopped;
                tracing::warn!("Synthetic encoder injecting fault");
                let _ = events.send(EncoderEvent::Error("synthetic encoder fault".to_string()));
                tokio::time::sleep(config.stop_latency).await;
                let _ = events.send(EncoderEvent::Stopped);
                return;
            }
            _ = &mut device_stop => {
                tracing::warn!("Synthetic device stopped on its own");
                *state.lock() = EncoderState::Stopped;
                break;
            }
            _ = &mut vanish => {
                tracing::warn!("Synthetic encoder vanishing without a stop event");
                return;
            }
            _ = ticker.tick() => {
                if !stream.is_live() {
                    // Track ended underneath us
                    *state.lock() = EncoderState::Stopped;
                    break;
                }
                sequence = sequence.wrapping_add(1);
                let _ = events.send(EncoderEvent::Chunk(vec![sequence; config.chunk_size]));
            }
        }
    }

    tokio::time::sleep(config.stop_latency).await;
    // Flush whatever was buffered since the last tick
    let _ = events.send(EncoderEvent::Chunk(vec![0; config.chunk_size / 2]));
    let _ = events.send(EncoderEvent::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_denied_camera() {
        let camera = SyntheticCamera::new(SyntheticConfig {
            available: false,
            ..Default::default()
        });
        let err = camera.acquire(&CameraConstraints::default()).await.err();
        assert!(matches!(err, Some(CaptureError::PermissionDenied(_))));
        assert_eq!(camera.stats().snapshot().acquisitions, 0);
    }

    #[tokio::test]
    async fn test_exclusive_until_tracks_stop() {
        let camera = SyntheticCamera::default();
        let first = camera.acquire(&CameraConstraints::default()).await.unwrap();

        let busy = camera.acquire(&CameraConstraints::default()).await.err();
        assert!(matches!(busy, Some(CaptureError::DeviceBusy(_))));

        first.stop_tracks();
        assert!(camera.acquire(&CameraConstraints::default()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoder_emits_chunks_then_stopped() {
        let camera = SyntheticCamera::default();
        let stream = camera.acquire(&CameraConstraints::default()).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let encoder = camera.start_encoder(stream, Some("video/webm"), tx).unwrap();
        assert_eq!(encoder.state(), EncoderState::Recording);
        assert_eq!(encoder.mime_type(), "video/webm");

        tokio::time::sleep(Duration::from_millis(350)).await;
        encoder.stop();
        encoder.stop();
        assert_eq!(encoder.state(), EncoderState::Stopped);

        let mut chunks = 0;
        loop {
            match rx.recv().await {
                Some(EncoderEvent::Chunk(_)) => chunks += 1,
                Some(EncoderEvent::Stopped) => break,
                other => panic!("unexpected event {other:?}"),
            }
        }
        // three ticks plus the flush
        assert_eq!(chunks, 4);
        assert_eq!(camera.stats().snapshot().stop_signals, 2);
    }
}
