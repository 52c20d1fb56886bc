//! Store errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying storage failed (unavailable, full, corrupt)
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid attempt: {0}")]
    InvalidAttempt(String),

    #[error("Store '{name}' has schema version {found}, expected at most {supported}")]
    SchemaMismatch {
        name: String,
        found: u32,
        supported: u32,
    },

    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),
}

/// Review bundle errors
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Missing required file: {0}")]
    MissingFile(String),
}

macro_rules! persistence_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Persistence(e.to_string())
                }
            }
        )*
    };
}

persistence_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    serde_json::Error,
    tokio::task::JoinError,
);
