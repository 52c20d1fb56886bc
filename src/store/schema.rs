//! Attempt schema definitions
//!
//! The persisted record of one self-administered test, plus the metadata the
//! store keeps about itself.

use super::error::StoreError;
use crate::recorder::RecordedClip;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Test Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Pushup,
    Plank,
    Squat,
    Vjump,
    Sprint,
}

impl TestType {
    pub const ALL: [TestType; 5] = [
        TestType::Pushup,
        TestType::Plank,
        TestType::Squat,
        TestType::Vjump,
        TestType::Sprint,
    ];

    /// Stable identifier, as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Pushup => "pushup",
            TestType::Plank => "plank",
            TestType::Squat => "squat",
            TestType::Vjump => "vjump",
            TestType::Sprint => "sprint",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            TestType::Pushup => "Push-ups",
            TestType::Plank => "Plank hold",
            TestType::Squat => "Squats",
            TestType::Vjump => "Vertical jump",
            TestType::Sprint => "Sprint",
        }
    }

    /// Example of what a score looks like for this test
    pub fn score_hint(&self) -> &'static str {
        match self {
            TestType::Pushup | TestType::Squat => "24 reps",
            TestType::Plank => "62s",
            TestType::Vjump => "48cm",
            TestType::Sprint => "7.9s",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| StoreError::InvalidAttempt(format!("unknown test type '{s}'")))
    }
}

// =============================================================================
// Attempt
// =============================================================================

/// Binary video payload with its declared media type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPayload {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: String,
    pub test_type: TestType,
    pub created_at: DateTime<Utc>,
    pub verified: bool,
    pub score_text: String,
    /// None only in legacy records
    pub video: Option<VideoPayload>,
    pub mime_type: String,
    pub duration_ms: u64,
}

impl Attempt {
    /// Build a new, unverified attempt from a completed clip
    pub fn from_clip(
        test_type: TestType,
        score_text: &str,
        clip: RecordedClip,
    ) -> Result<Self, StoreError> {
        let attempt = Self {
            id: Uuid::new_v4().to_string(),
            test_type,
            created_at: clip.completed_at,
            verified: false,
            score_text: score_text.trim().to_string(),
            video: Some(VideoPayload {
                bytes: clip.data,
                media_type: clip.mime_type.clone(),
            }),
            mime_type: clip.mime_type,
            duration_ms: clip.duration_ms,
        };
        attempt.validate()?;
        Ok(attempt)
    }

    /// Check the record invariants before it is written
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.id.trim().is_empty() {
            return Err(StoreError::InvalidAttempt("id is empty".to_string()));
        }
        if self.score_text.trim().is_empty() {
            return Err(StoreError::InvalidAttempt("score is empty".to_string()));
        }
        if let Some(video) = &self.video {
            if self.mime_type.trim().is_empty() || video.media_type.trim().is_empty() {
                return Err(StoreError::InvalidAttempt(
                    "video present without a media type".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn video_len(&self) -> usize {
        self.video.as_ref().map(|v| v.bytes.len()).unwrap_or(0)
    }

    pub fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            id: self.id.clone(),
            test_type: self.test_type,
            created_at: self.created_at,
            verified: self.verified,
            score_text: self.score_text.clone(),
            mime_type: self.mime_type.clone(),
            duration_ms: self.duration_ms,
            video_media_type: self.video.as_ref().map(|v| v.media_type.clone()),
            video_bytes: self.video_len(),
        }
    }
}

/// Attempt without its payload, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    pub id: String,
    pub test_type: TestType,
    pub created_at: DateTime<Utc>,
    pub verified: bool,
    pub score_text: String,
    pub mime_type: String,
    pub duration_ms: u64,
    /// Media type of the video payload; None when the record has no video
    #[serde(default)]
    pub video_media_type: Option<String>,
    pub video_bytes: usize,
}

// =============================================================================
// Store Meta
// =============================================================================

/// Written once when the store is provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMeta {
    pub name: String,
    pub version: u32,
    pub format: String,
    pub created_at: DateTime<Utc>,
}

impl StoreMeta {
    pub fn new(name: &str, version: u32) -> Self {
        Self {
            name: name.to_string(),
            version,
            format: "fitcheck-attempts-v1".to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::StopReason;

    fn clip() -> RecordedClip {
        RecordedClip {
            data: vec![7; 128],
            mime_type: "video/webm".to_string(),
            duration_ms: 1_500,
            stop_reason: StopReason::Manual,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_clip() {
        let attempt = Attempt::from_clip(TestType::Pushup, " 24 reps ", clip()).unwrap();
        assert!(!attempt.verified);
        assert_eq!(attempt.score_text, "24 reps");
        assert_eq!(attempt.mime_type, "video/webm");
        assert_eq!(attempt.video_len(), 128);
        assert_eq!(attempt.duration_ms, 1_500);
        assert!(Uuid::parse_str(&attempt.id).is_ok());
    }

    #[test]
    fn test_blank_score_rejected() {
        let err = Attempt::from_clip(TestType::Plank, "   ", clip()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidAttempt(_)));
    }

    #[test]
    fn test_test_type_names() {
        assert_eq!("VJUMP".parse::<TestType>().unwrap(), TestType::Vjump);
        assert!("burpee".parse::<TestType>().is_err());
        assert_eq!(
            serde_json::to_string(&TestType::Pushup).unwrap(),
            "\"pushup\""
        );
    }
}
