//! Command handlers
//!
//! Entry points a UI layer calls. Errors come back as [`ErrorResponse`]
//! values with a stable code.
//!
//! [`ErrorResponse`]: crate::utils::error::ErrorResponse

pub mod attempts;
pub mod system;
