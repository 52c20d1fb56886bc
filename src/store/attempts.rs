//! Attempt store
//!
//! Durable keyed collection of attempts in an embedded redb database. The
//! record and its video bytes are written in one transaction, so a reader sees
//! either the whole attempt or nothing. Listing follows insertion order; a
//! replaced record keeps its original position.
//!
//! The database is opened lazily on first access and the handle is reused for
//! the lifetime of the store object. Construct one store and pass it by
//! reference.

use super::error::StoreError;
use super::schema::{Attempt, AttemptSummary, StoreMeta, TestType, VideoPayload};
use crate::recorder::RecordedClip;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

// Table definitions
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const ATTEMPTS: TableDefinition<&str, &[u8]> = TableDefinition::new("attempts");
const VIDEOS: TableDefinition<&str, &[u8]> = TableDefinition::new("videos");
const ORDER: TableDefinition<u64, &str> = TableDefinition::new("order");

const META_KEY: &str = "store";

/// Schema version written by this build
pub const STORE_VERSION: u32 = 1;

/// Where and under which name the store lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Directory holding the database file
    pub path: PathBuf,

    /// Store name, also the database file stem
    pub name: String,

    /// Schema version to open with
    pub version: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fitcheck-data"),
            name: "fitness-attempts".to_string(),
            version: STORE_VERSION,
        }
    }
}

impl StoreConfig {
    pub fn in_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Full path of the database file
    pub fn database_path(&self) -> PathBuf {
        self.path.join(format!("{}.redb", self.name))
    }
}

/// Attempt record as stored, minus the video bytes
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAttempt {
    seq: u64,
    test_type: TestType,
    created_at: DateTime<Utc>,
    verified: bool,
    score_text: String,
    video_media_type: Option<String>,
    mime_type: String,
    duration_ms: u64,
}

impl StoredAttempt {
    fn new(seq: u64, attempt: &Attempt) -> Self {
        Self {
            seq,
            test_type: attempt.test_type,
            created_at: attempt.created_at,
            verified: attempt.verified,
            score_text: attempt.score_text.clone(),
            video_media_type: attempt.video.as_ref().map(|v| v.media_type.clone()),
            mime_type: attempt.mime_type.clone(),
            duration_ms: attempt.duration_ms,
        }
    }

    fn into_summary(self, id: &str, video_bytes: usize) -> AttemptSummary {
        AttemptSummary {
            id: id.to_string(),
            test_type: self.test_type,
            created_at: self.created_at,
            verified: self.verified,
            score_text: self.score_text,
            mime_type: self.mime_type,
            duration_ms: self.duration_ms,
            video_media_type: self.video_media_type,
            video_bytes,
        }
    }

    fn into_attempt(self, id: &str, bytes: Option<Vec<u8>>) -> Attempt {
        let video = match (self.video_media_type, bytes) {
            (Some(media_type), Some(bytes)) => Some(VideoPayload { bytes, media_type }),
            _ => None,
        };
        Attempt {
            id: id.to_string(),
            test_type: self.test_type,
            created_at: self.created_at,
            verified: self.verified,
            score_text: self.score_text,
            video,
            mime_type: self.mime_type,
            duration_ms: self.duration_ms,
        }
    }
}

/// Durable keyed collection of attempts
pub struct AttemptStore {
    config: StoreConfig,
    db: OnceCell<Arc<Database>>,
}

impl AttemptStore {
    /// Create a store. Nothing touches the disk until first access.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Create a store and provision it immediately
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let store = Self::new(config);
        store.init().await?;
        Ok(store)
    }

    /// One-time initialization. Idempotent.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.handle().await.map(|_| ())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether the database has been opened yet
    pub fn is_initialized(&self) -> bool {
        self.db.initialized()
    }

    async fn handle(&self) -> Result<Arc<Database>, StoreError> {
        let db = self
            .db
            .get_or_try_init(|| {
                let config = self.config.clone();
                async move {
                    tokio::task::spawn_blocking(move || provision(&config))
                        .await?
                        .map(Arc::new)
                }
            })
            .await?;
        Ok(db.clone())
    }

    /// Insert or replace the attempt at `attempt.id`.
    ///
    /// Returns once the record and its video are committed.
    pub async fn put(&self, attempt: &Attempt) -> Result<(), StoreError> {
        attempt.validate()?;
        let db = self.handle().await?;
        let attempt = attempt.clone();
        tokio::task::spawn_blocking(move || write_attempt(&db, &attempt)).await?
    }

    /// Build an attempt from a completed clip and store it
    pub async fn save(
        &self,
        test_type: TestType,
        score_text: &str,
        clip: RecordedClip,
    ) -> Result<Attempt, StoreError> {
        let attempt = Attempt::from_clip(test_type, score_text, clip)?;
        self.put(&attempt).await?;
        Ok(attempt)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Attempt>, StoreError> {
        let db = self.handle().await?;
        let id = id.to_string();
        tokio::task::spawn_blocking(move || read_attempt(&db, &id)).await?
    }

    /// All attempts in insertion order
    pub async fn list(&self) -> Result<Vec<Attempt>, StoreError> {
        let db = self.handle().await?;
        tokio::task::spawn_blocking(move || read_all(&db)).await?
    }

    /// All attempts without payloads, in insertion order.
    ///
    /// Video sizes come from the stored values; no payload is copied.
    pub async fn list_summaries(&self) -> Result<Vec<AttemptSummary>, StoreError> {
        let db = self.handle().await?;
        tokio::task::spawn_blocking(move || read_summaries(&db)).await?
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        let db = self.handle().await?;
        tokio::task::spawn_blocking(move || -> Result<usize, StoreError> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(ORDER)?;
            Ok(table.len()? as usize)
        })
        .await?
    }

    /// Store metadata written at provisioning
    pub async fn meta(&self) -> Result<StoreMeta, StoreError> {
        let db = self.handle().await?;
        tokio::task::spawn_blocking(move || -> Result<StoreMeta, StoreError> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(META)?;
            let value = table
                .get(META_KEY)?
                .ok_or_else(|| StoreError::Persistence("store metadata missing".to_string()))?;
            Ok(serde_json::from_slice(value.value())?)
        })
        .await?
    }
}

/// Open or create the database and its tables
fn provision(config: &StoreConfig) -> Result<Database, StoreError> {
    std::fs::create_dir_all(&config.path).map_err(|e| {
        StoreError::Persistence(format!("Failed to create {}: {}", config.path.display(), e))
    })?;

    let db_path = config.database_path();
    tracing::info!("Opening attempt store at: {}", db_path.display());

    let db = Database::create(&db_path)?;

    let write_txn = db.begin_write()?;
    {
        let mut meta_table = write_txn.open_table(META)?;
        let existing = match meta_table.get(META_KEY)? {
            Some(value) => Some(serde_json::from_slice::<StoreMeta>(value.value())?),
            None => None,
        };

        match existing {
            Some(meta) => check_meta(&meta, config)?,
            None => {
                let meta = StoreMeta::new(&config.name, config.version);
                meta_table.insert(META_KEY, serde_json::to_vec(&meta)?.as_slice())?;
                tracing::info!("Provisioned store '{}' v{}", meta.name, meta.version);
            }
        }

        write_txn.open_table(ATTEMPTS)?;
        write_txn.open_table(VIDEOS)?;
        write_txn.open_table(ORDER)?;
    }
    write_txn.commit()?;

    tracing::debug!("Attempt store ready");
    Ok(db)
}

fn check_meta(meta: &StoreMeta, config: &StoreConfig) -> Result<(), StoreError> {
    if meta.name != config.name || meta.version > config.version {
        return Err(StoreError::SchemaMismatch {
            name: meta.name.clone(),
            found: meta.version,
            supported: config.version,
        });
    }
    Ok(())
}

fn write_attempt(db: &Database, attempt: &Attempt) -> Result<(), StoreError> {
    let write_txn = db.begin_write()?;
    {
        let mut attempts = write_txn.open_table(ATTEMPTS)?;
        let mut videos = write_txn.open_table(VIDEOS)?;
        let mut order = write_txn.open_table(ORDER)?;

        let existing_seq = match attempts.get(attempt.id.as_str())? {
            Some(value) => Some(serde_json::from_slice::<StoredAttempt>(value.value())?.seq),
            None => None,
        };
        let seq = match existing_seq {
            Some(seq) => seq,
            None => {
                let next = order.last()?.map(|(key, _)| key.value() + 1).unwrap_or(0);
                order.insert(next, attempt.id.as_str())?;
                next
            }
        };

        let record = serde_json::to_vec(&StoredAttempt::new(seq, attempt))?;
        attempts.insert(attempt.id.as_str(), record.as_slice())?;

        match &attempt.video {
            Some(video) => {
                videos.insert(attempt.id.as_str(), video.bytes.as_slice())?;
            }
            None => {
                videos.remove(attempt.id.as_str())?;
            }
        }
    }
    write_txn.commit()?;

    tracing::debug!(
        "Stored attempt {} ({}, {} video bytes)",
        attempt.id,
        attempt.test_type,
        attempt.video_len()
    );
    Ok(())
}

fn read_attempt(db: &Database, id: &str) -> Result<Option<Attempt>, StoreError> {
    let read_txn = db.begin_read()?;
    let attempts = read_txn.open_table(ATTEMPTS)?;
    let videos = read_txn.open_table(VIDEOS)?;

    let stored: StoredAttempt = match attempts.get(id)? {
        Some(value) => serde_json::from_slice(value.value())?,
        None => return Ok(None),
    };
    let bytes = videos.get(id)?.map(|value| value.value().to_vec());

    Ok(Some(stored.into_attempt(id, bytes)))
}

fn read_all(db: &Database) -> Result<Vec<Attempt>, StoreError> {
    let read_txn = db.begin_read()?;
    let order = read_txn.open_table(ORDER)?;
    let attempts = read_txn.open_table(ATTEMPTS)?;
    let videos = read_txn.open_table(VIDEOS)?;

    let mut results = Vec::new();
    for entry in order.range::<u64>(..)? {
        let (_seq, id) = entry?;
        let id = id.value();

        let stored: StoredAttempt = match attempts.get(id)? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => {
                tracing::warn!("Order entry without attempt record: {}", id);
                continue;
            }
        };
        let bytes = videos.get(id)?.map(|value| value.value().to_vec());
        results.push(stored.into_attempt(id, bytes));
    }
    Ok(results)
}

fn read_summaries(db: &Database) -> Result<Vec<AttemptSummary>, StoreError> {
    let read_txn = db.begin_read()?;
    let order = read_txn.open_table(ORDER)?;
    let attempts = read_txn.open_table(ATTEMPTS)?;
    let videos = read_txn.open_table(VIDEOS)?;

    let mut results = Vec::new();
    for entry in order.range::<u64>(..)? {
        let (_seq, id) = entry?;
        let id = id.value();

        let stored: StoredAttempt = match attempts.get(id)? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => continue,
        };
        let video_bytes = match &stored.video_media_type {
            Some(_) => videos.get(id)?.map(|value| value.value().len()).unwrap_or(0),
            None => 0,
        };
        results.push(stored.into_summary(id, video_bytes));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn attempt(id: &str, test_type: TestType, score: &str, bytes: usize) -> Attempt {
        Attempt {
            id: id.to_string(),
            test_type,
            created_at: Utc::now(),
            verified: false,
            score_text: score.to_string(),
            video: Some(VideoPayload {
                bytes: (0..bytes).map(|i| (i % 251) as u8).collect(),
                media_type: "video/webm;codecs=vp8,opus".to_string(),
            }),
            mime_type: "video/webm;codecs=vp8,opus".to_string(),
            duration_ms: 62_000,
        }
    }

    #[tokio::test]
    async fn test_put_then_get_plank() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));

        let a1 = attempt("a1", TestType::Plank, "62s", 2048);
        store.put(&a1).await.unwrap();

        let loaded = store.get("a1").await.unwrap().unwrap();
        assert_eq!(loaded, a1);
        assert!(!loaded.verified);
        assert_eq!(loaded.score_text, "62s");
    }

    #[tokio::test]
    async fn test_payload_survives_round_trip() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));

        let big = attempt("big", TestType::Sprint, "7.9s", 3 * 1024 * 1024 + 17);
        store.put(&big).await.unwrap();

        let loaded = store.get("big").await.unwrap().unwrap();
        let video = loaded.video.unwrap();
        assert_eq!(video.bytes.len(), 3 * 1024 * 1024 + 17);
        assert_eq!(video.media_type, "video/webm;codecs=vp8,opus");
        assert_eq!(video.bytes, big.video.unwrap().bytes);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_in_insertion_order() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));

        // ids deliberately not in lexical order
        let ids = ["zeta", "alpha", "mid", "beta"];
        for id in ids {
            store.put(&attempt(id, TestType::Pushup, "20 reps", 16)).await.unwrap();
        }

        let listed: Vec<String> = store.list().await.unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(listed, ids);
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_summaries_match_records() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));

        store.put(&attempt("p", TestType::Pushup, "24 reps", 777)).await.unwrap();
        let mut legacy = attempt("l", TestType::Plank, "62s", 0);
        legacy.video = None;
        store.put(&legacy).await.unwrap();

        let summaries = store.list_summaries().await.unwrap();
        let expected: Vec<AttemptSummary> =
            store.list().await.unwrap().iter().map(Attempt::summary).collect();
        assert_eq!(summaries, expected);
        assert_eq!(summaries[0].video_bytes, 777);
        assert_eq!(
            summaries[0].video_media_type.as_deref(),
            Some("video/webm;codecs=vp8,opus")
        );
        assert_eq!(summaries[1].video_bytes, 0);
        assert!(summaries[1].video_media_type.is_none());
    }

    #[tokio::test]
    async fn test_replace_keeps_position() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));

        store.put(&attempt("first", TestType::Squat, "30 reps", 8)).await.unwrap();
        store.put(&attempt("second", TestType::Squat, "31 reps", 8)).await.unwrap();

        let mut replaced = attempt("first", TestType::Squat, "32 reps", 4);
        replaced.verified = true;
        store.put(&replaced).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], replaced);
        assert_eq!(listed[1].id, "second");
    }

    #[tokio::test]
    async fn test_invalid_attempt_not_written() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));

        let blank = attempt("blank", TestType::Plank, "  ", 8);
        assert!(matches!(
            store.put(&blank).await,
            Err(StoreError::InvalidAttempt(_))
        ));

        let mut untyped = attempt("untyped", TestType::Plank, "60s", 8);
        untyped.mime_type.clear();
        assert!(store.put(&untyped).await.is_err());

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_legacy_attempt_without_video() {
        // Degenerate record: accepted as-is and read back without a payload
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));

        let mut legacy = attempt("legacy", TestType::Vjump, "48cm", 0);
        legacy.video = None;
        legacy.mime_type = String::new();
        legacy.duration_ms = 0;
        store.put(&legacy).await.unwrap();

        let loaded = store.get("legacy").await.unwrap().unwrap();
        assert_eq!(loaded, legacy);
        assert_eq!(loaded.video_len(), 0);
    }

    #[tokio::test]
    async fn test_replacing_with_legacy_drops_video() {
        let dir = tempdir().unwrap();
        let store = AttemptStore::new(StoreConfig::in_dir(dir.path()));

        store.put(&attempt("x", TestType::Plank, "60s", 64)).await.unwrap();
        let mut legacy = attempt("x", TestType::Plank, "60s", 0);
        legacy.video = None;
        store.put(&legacy).await.unwrap();

        assert!(store.get("x").await.unwrap().unwrap().video.is_none());
    }

    #[tokio::test]
    async fn test_lazy_init_and_reopen() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::in_dir(dir.path().join("nested"));
        let db_path = config.database_path();

        let store = AttemptStore::new(config.clone());
        assert!(!store.is_initialized());
        assert!(!db_path.exists());

        store.put(&attempt("keep", TestType::Pushup, "24 reps", 32)).await.unwrap();
        assert!(store.is_initialized());
        assert!(db_path.exists());
        store.init().await.unwrap();
        drop(store);

        let reopened = AttemptStore::open(config).await.unwrap();
        assert_eq!(reopened.get("keep").await.unwrap().unwrap().score_text, "24 reps");
        assert_eq!(reopened.meta().await.unwrap().version, STORE_VERSION);
    }

    #[tokio::test]
    async fn test_newer_schema_refused() {
        let dir = tempdir().unwrap();
        let newer = StoreConfig {
            version: STORE_VERSION + 1,
            ..StoreConfig::in_dir(dir.path())
        };
        AttemptStore::open(newer).await.unwrap();

        let err = AttemptStore::open(StoreConfig::in_dir(dir.path())).await.err();
        assert!(matches!(err, Some(StoreError::SchemaMismatch { .. })));
    }

    #[tokio::test]
    async fn test_unavailable_storage_is_persistence_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = AttemptStore::new(StoreConfig::in_dir(&blocker));
        let err = store.put(&attempt("a", TestType::Plank, "1s", 1)).await.err();
        assert!(matches!(err, Some(StoreError::Persistence(_))));
    }
}
