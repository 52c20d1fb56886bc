//! Error types and handling
//!
//! Common error types used across the application.

use crate::recorder::RecordingError;
use crate::store::{BundleError, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<BundleError> for AppError {
    fn from(error: BundleError) -> Self {
        AppError::Store(StoreError::Bundle(error))
    }
}

/// Error response for callers outside the crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Recording(RecordingError::DeviceUnavailable(_)) => "DEVICE_UNAVAILABLE",
            AppError::Recording(RecordingError::CaptureFailed(_)) => "CAPTURE_FAILED",
            AppError::Recording(RecordingError::InvalidTransition { .. }) => "INVALID_TRANSITION",
            AppError::Store(StoreError::Persistence(_)) => "PERSISTENCE_ERROR",
            AppError::Store(StoreError::InvalidAttempt(_)) => "INVALID_ATTEMPT",
            AppError::Store(StoreError::SchemaMismatch { .. }) => "SCHEMA_MISMATCH",
            AppError::Store(StoreError::Bundle(_)) => "BUNDLE_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<RecordingError> for ErrorResponse {
    fn from(error: RecordingError) -> Self {
        AppError::from(error).into()
    }
}

impl From<StoreError> for ErrorResponse {
    fn from(error: StoreError) -> Self {
        AppError::from(error).into()
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
