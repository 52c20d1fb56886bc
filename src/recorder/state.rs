//! Recording state management
//!
//! Defines the session state machine and the values a session produces.

use crate::capture::codec::default_preferences;
use crate::capture::CameraConstraints;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Auto-stop applied when the caller does not pick a maximum
pub const DEFAULT_MAX_DURATION_MS: u64 = 90_000;

/// Observable state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No camera held
    #[default]
    Idle,
    /// Camera acquired, not recording
    CameraActive,
    /// Capture running
    Recording,
    /// Stop signalled, waiting for the hardware to confirm
    StoppingNormal,
    /// Cancel requested, waiting for the hardware to confirm
    StoppingCancelled,
    /// Clip produced
    Completed,
    /// Session cancelled, nothing produced
    Cancelled,
    /// Capture failed mid-recording
    Failed,
}

impl SessionState {
    /// Whether the session has produced its one outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// What ended a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// `request_stop` from the user
    Manual,
    /// Maximum duration elapsed
    AutoStop,
    /// `request_cancel` from the user
    Cancelled,
    /// The device stopped on its own (track ended, unplugged)
    Device,
    /// Encoder reported an error
    Error,
}

/// A completed capture. Owns the encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedClip {
    /// Encoded container bytes
    pub data: Vec<u8>,

    /// Container/codec actually used by the encoder
    pub mime_type: String,

    /// Time from capture start to hardware-confirmed stop
    pub duration_ms: u64,

    /// What ended the capture
    pub stop_reason: StopReason,

    /// When the hardware confirmed the stop
    pub completed_at: DateTime<Utc>,
}

impl RecordedClip {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The one terminal outcome of a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    Completed(RecordedClip),
    Cancelled {
        /// How long the capture ran before the cancelled stop was confirmed
        duration_ms: u64,
    },
}

impl RecordingOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The clip, if the capture completed
    pub fn into_clip(self) -> Option<RecordedClip> {
        match self {
            Self::Completed(clip) => Some(clip),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Configuration for recording sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingConfig {
    /// Auto-stop after this long
    pub max_duration_ms: u64,

    /// Containers to try, best first
    pub codec_preferences: Vec<String>,

    /// Camera constraints used when acquiring
    pub constraints: CameraConstraints,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            codec_preferences: default_preferences(),
            constraints: CameraConstraints::default(),
        }
    }
}
