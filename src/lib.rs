//! fitcheck - self-administered fitness tests, recorded and kept locally.
//!
//! A [`RecordingSession`] drives one camera through acquisition, a timed
//! capture, and a stop or cancel. Completed captures are saved as
//! [`Attempt`]s in an [`AttemptStore`].

pub mod capture;
pub mod commands;
pub mod config;
pub mod recorder;
pub mod store;
pub mod utils;

pub use config::AppConfig;
pub use recorder::{
    ActiveCapture, CaptureControl, RecordedClip, RecordingError, RecordingOutcome,
    RecordingSession, SessionState,
};
pub use store::{Attempt, AttemptStore, StoreConfig, StoreError, TestType};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging.
///
/// Honors `RUST_LOG`; defaults to debug output for this crate. Safe to call
/// more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitcheck=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    tracing::debug!("fitcheck v{}", env!("CARGO_PKG_VERSION"));
}
