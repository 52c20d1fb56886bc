//! Camera capture backends
//!
//! The recorder talks to cameras only through the traits in [`traits`].

pub mod codec;
pub mod synthetic;
pub mod traits;

#[cfg(feature = "native-camera")]
pub mod native;

pub use codec::{select_codec, CODEC_PREFERENCES, PLATFORM_DEFAULT_CODEC};
pub use synthetic::{SyntheticCamera, SyntheticConfig};
pub use traits::{
    CameraConstraints, CameraInfo, CaptureBackend, CaptureError, CaptureResult, Encoder,
    EncoderEvent, EncoderState, FacingMode, MediaStream, Resolution,
};
