//! Recording system module
//!
//! - RecordingSession drives one camera through acquire, capture and stop/cancel
//! - CaptureControl lets other tasks stop or cancel a running capture
//! - RecordingOutcome is the single result a session produces

pub mod error;
pub mod session;
pub mod state;

pub use error::{RecordingError, RecordingResult};
pub use session::{ActiveCapture, CameraHandle, CaptureControl, RecordingEvent, RecordingSession};
pub use state::{
    RecordedClip, RecordingConfig, RecordingOutcome, SessionState, StopReason,
    DEFAULT_MAX_DURATION_MS,
};
