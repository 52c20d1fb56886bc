//! Capture trait definitions
//!
//! Platform-agnostic traits for the camera device and the encoder that turns
//! a live camera stream into container bytes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by a capture backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera not found: {0}")]
    DeviceNotFound(String),

    #[error("Camera busy: {0}")]
    DeviceBusy(String),

    #[error("Encoder error: {0}")]
    Encoder(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Which way the requested camera should face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, pointed at the person doing the test
    #[default]
    User,
    /// Rear camera
    Environment,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Constraints passed to the device when acquiring a camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraConstraints {
    /// Specific device to open (None = pick by facing mode)
    pub device_id: Option<String>,

    /// Preferred facing mode
    pub facing: FacingMode,

    /// Ideal capture resolution
    pub resolution: Option<Resolution>,

    /// Ideal frame rate
    pub frame_rate: Option<u32>,

    /// Whether to capture the microphone alongside video
    pub audio: bool,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            facing: FacingMode::User,
            resolution: Some(Resolution {
                width: 1280,
                height: 720,
            }),
            frame_rate: Some(30),
            audio: false,
        }
    }
}

/// Information about a camera/webcam
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// A live camera stream returned by [`CaptureBackend::acquire`].
///
/// Holding a stream reserves the device. `stop_tracks` ends every track and
/// frees the reservation; a second call must be harmless.
pub trait MediaStream: Send + Sync {
    /// Device backing this stream
    fn info(&self) -> &CameraInfo;

    /// Stop every track of the stream
    fn stop_tracks(&self);

    /// Whether any track is still delivering frames
    fn is_live(&self) -> bool;
}

/// Run-state of an encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    Idle,
    Recording,
    Stopped,
}

/// Events emitted by an encoder on its event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// Next slice of encoded container bytes
    Chunk(Vec<u8>),
    /// Hardware or codec failure; a `Stopped` event still follows
    Error(String),
    /// Terminal event: no further data will be produced
    Stopped,
}

/// A running encoder attached to one camera stream.
///
/// `stop` only signals; the encoder flushes and then delivers
/// [`EncoderEvent::Stopped`] on its event channel exactly once.
pub trait Encoder: Send + Sync {
    /// Container/codec actually in use
    fn mime_type(&self) -> &str;

    /// Current run-state
    fn state(&self) -> EncoderState;

    /// Ask the encoder to stop. Must not block.
    fn stop(&self);
}

/// A camera + codec provider (host platform or a software stand-in)
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire a camera matching the constraints
    async fn acquire(&self, constraints: &CameraConstraints) -> CaptureResult<Arc<dyn MediaStream>>;

    /// Whether the encoder can produce the given container/codec string
    fn supports_codec(&self, mime_type: &str) -> bool;

    /// Codec used when no preference is supported
    fn default_codec(&self) -> &str;

    /// Start encoding the stream. `mime_type` of None means the platform default.
    fn start_encoder(
        &self,
        stream: Arc<dyn MediaStream>,
        mime_type: Option<&str>,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> CaptureResult<Box<dyn Encoder>>;
}
