//! Review bundle read/write operations
//!
//! A review bundle is a directory holding one attempt for offline review:
//! - attempt.json: the attempt record without its payload
//! - video.<ext>: the recorded video, extension from its media type
//!
//! Files are written through a temp file and renamed into place, so a crash
//! never leaves a half-written attempt.json next to a valid video.

use super::error::BundleError;
use super::schema::{Attempt, AttemptSummary, VideoPayload};
use crate::capture::codec::file_extension;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Get the bundle extension
pub const BUNDLE_EXTENSION: &str = "fca";

const ATTEMPT_FILE: &str = "attempt.json";
const VIDEO_STEM: &str = "video";

/// Write an attempt into `<parent>/<id>.fca`, returning the bundle path
pub fn export_attempt(attempt: &Attempt, parent: &Path) -> Result<PathBuf, BundleError> {
    attempt
        .validate()
        .map_err(|e| BundleError::InvalidBundle(e.to_string()))?;

    let bundle_path = parent.join(format!("{}.{}", attempt.id, BUNDLE_EXTENSION));
    fs::create_dir_all(&bundle_path)?;

    // Video before record: a bundle with attempt.json is complete
    if let Some(video) = &attempt.video {
        let name = format!("{}.{}", VIDEO_STEM, file_extension(&video.media_type));
        write_atomic(&bundle_path, &name, &video.bytes)?;
    }

    let record = serde_json::to_vec_pretty(&attempt.summary())?;
    write_atomic(&bundle_path, ATTEMPT_FILE, &record)?;

    tracing::debug!("Exported attempt {} to {:?}", attempt.id, bundle_path);

    Ok(bundle_path)
}

/// Read an attempt back from a bundle directory
pub fn read_bundle(bundle_path: &Path) -> Result<Attempt, BundleError> {
    if !bundle_path.is_dir() {
        return Err(BundleError::InvalidBundle(
            "Path is not a directory".to_string(),
        ));
    }

    let record_path = bundle_path.join(ATTEMPT_FILE);
    if !record_path.exists() {
        return Err(BundleError::MissingFile(ATTEMPT_FILE.to_string()));
    }

    let content = fs::read_to_string(&record_path)?;
    let summary: AttemptSummary = serde_json::from_str(&content)?;

    let video = match &summary.video_media_type {
        Some(media_type) => {
            let name = format!("{}.{}", VIDEO_STEM, file_extension(media_type));
            let video_path = bundle_path.join(&name);
            if !video_path.exists() {
                return Err(BundleError::MissingFile(name));
            }
            let bytes = fs::read(&video_path)?;
            if bytes.len() != summary.video_bytes {
                return Err(BundleError::InvalidBundle(format!(
                    "{} holds {} bytes, record says {}",
                    name,
                    bytes.len(),
                    summary.video_bytes
                )));
            }
            Some(VideoPayload {
                bytes,
                media_type: media_type.clone(),
            })
        }
        None => None,
    };

    tracing::debug!("Loaded attempt {} from {:?}", summary.id, bundle_path);

    Ok(Attempt {
        id: summary.id,
        test_type: summary.test_type,
        created_at: summary.created_at,
        verified: summary.verified,
        score_text: summary.score_text,
        video,
        mime_type: summary.mime_type,
        duration_ms: summary.duration_ms,
    })
}

/// Check if a path is a valid review bundle
pub fn is_valid_bundle(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }

    path.join(ATTEMPT_FILE).exists()
}

fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> Result<(), BundleError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}
