//! Application configuration
//!
//! Read from a JSON file, then overridden from the environment:
//! - FITCHECK_STORE_PATH: directory holding the attempt database
//! - FITCHECK_MAX_DURATION_MS: auto-stop limit for a capture

use crate::recorder::RecordingConfig;
use crate::store::StoreConfig;
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_STORE_PATH: &str = "FITCHECK_STORE_PATH";
pub const ENV_MAX_DURATION_MS: &str = "FITCHECK_MAX_DURATION_MS";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub recording: RecordingConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load from `path` and apply environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read_file(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply overrides from a key lookup, normally the process environment
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_STORE_PATH).filter(|p| !p.trim().is_empty()) {
            self.store.path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_MAX_DURATION_MS) {
            let max_duration_ms: u64 = raw.trim().parse().map_err(|_| {
                AppError::Config(format!("{ENV_MAX_DURATION_MS} is not a number: {raw}"))
            })?;
            if max_duration_ms == 0 {
                return Err(AppError::Config(format!("{ENV_MAX_DURATION_MS} must be positive")));
            }
            self.recording.max_duration_ms = max_duration_ms;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::DEFAULT_MAX_DURATION_MS;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::read_file(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.recording.max_duration_ms, DEFAULT_MAX_DURATION_MS);
        assert_eq!(config.store.name, "fitness-attempts");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fitcheck.json");
        fs::write(
            &path,
            r#"{ "recording": { "maxDurationMs": 30000 }, "store": { "path": "/data/fit" } }"#,
        )
        .unwrap();

        let config = AppConfig::read_file(&path).unwrap();
        assert_eq!(config.recording.max_duration_ms, 30_000);
        assert!(!config.recording.codec_preferences.is_empty());
        assert_eq!(config.store.path, PathBuf::from("/data/fit"));
        assert_eq!(config.store.version, 1);
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fitcheck.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(AppConfig::read_file(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_STORE_PATH, "/tmp/attempts"),
                (ENV_MAX_DURATION_MS, "45000"),
            ]))
            .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/attempts"));
        assert_eq!(config.recording.max_duration_ms, 45_000);

        assert!(config
            .apply_overrides(env(&[(ENV_MAX_DURATION_MS, "soon")]))
            .is_err());
        assert!(config
            .apply_overrides(env(&[(ENV_MAX_DURATION_MS, "0")]))
            .is_err());
        assert_eq!(config.recording.max_duration_ms, 45_000);
    }
}
