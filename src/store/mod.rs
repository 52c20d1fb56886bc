//! Attempt storage
//!
//! Attempts are kept in a local redb database and can be exported as review
//! bundles for someone else to verify.

pub mod attempts;
pub mod bundle;
pub mod error;
pub mod schema;

pub use attempts::{AttemptStore, StoreConfig, STORE_VERSION};
pub use bundle::{export_attempt, is_valid_bundle, read_bundle, BUNDLE_EXTENSION};
pub use error::{BundleError, StoreError};
pub use schema::{Attempt, AttemptSummary, StoreMeta, TestType, VideoPayload};
