//! Recording errors

use super::state::SessionState;
use crate::capture::CaptureError;
use thiserror::Error;

/// Errors surfaced by a [`RecordingSession`](super::RecordingSession)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    /// Camera permission denied, no device, or device held elsewhere
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Hardware or codec failure while capturing
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// Operation called in a state that does not allow it
    #[error("Cannot {operation} while {from:?}")]
    InvalidTransition {
        from: SessionState,
        operation: &'static str,
    },
}

pub type RecordingResult<T> = Result<T, RecordingError>;

impl From<CaptureError> for RecordingError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::PermissionDenied(_)
            | CaptureError::DeviceNotFound(_)
            | CaptureError::DeviceBusy(_) => RecordingError::DeviceUnavailable(error.to_string()),
            CaptureError::Encoder(message) => RecordingError::CaptureFailed(message),
        }
    }
}
