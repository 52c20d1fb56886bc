//! System commands
//!
//! Host information and camera enumeration.

use crate::capture::CameraInfo;
use serde::{Deserialize, Serialize};

/// System information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub version: String,
    /// Whether this build can open real cameras
    pub native_camera: bool,
}

/// Get basic system information
pub fn get_system_info() -> SystemInfo {
    SystemInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        native_camera: cfg!(feature = "native-camera"),
    }
}

/// Get list of available cameras
pub async fn get_cameras() -> Vec<CameraInfo> {
    #[cfg(feature = "native-camera")]
    {
        tokio::task::spawn_blocking(crate::capture::native::list_cameras)
            .await
            .unwrap_or_default()
    }

    #[cfg(not(feature = "native-camera"))]
    {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_info() {
        let info = get_system_info();
        assert_eq!(info.os, std::env::consts::OS);
        assert!(!info.version.is_empty());
    }

    #[cfg(not(feature = "native-camera"))]
    #[tokio::test]
    async fn test_no_cameras_without_native_backend() {
        assert!(get_cameras().await.is_empty());
    }
}
