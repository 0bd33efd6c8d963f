//! Local race cache
//!
//! Decoded races are persisted so a revisit skips the download. Each entry is
//! a versioned JSON record, zstd-compressed, one file per race:
//!
//! ```text
//! {cache_dir}/2024-1.json.zst  ->  {"data": .., "savedAt": .., "year": 2024, "round": 1, "version": "v2"}
//! ```
//!
//! A record whose `version` differs from [`CACHE_VERSION`], or that fails to
//! decompress or decode, is deleted and reported as a miss.

use chrono::{DateTime, Utc};
use frr_core::{RaceData, RaceKey};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Bump whenever the persisted schema changes incompatibly
pub const CACHE_VERSION: &str = "v2";

const COMPRESSION_LEVEL: i32 = 3;
const FILE_SUFFIX: &str = ".json.zst";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Cache record encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache record compression failed: {0}")]
    Compression(String),
}

/// A persisted cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRaceRecord {
    pub data: RaceData,
    pub saved_at: DateTime<Utc>,
    pub year: u16,
    pub round: u8,
    pub version: String,
}

/// Borrowed form of [`CachedRaceRecord`] used when writing
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CachedRaceRecordRef<'a> {
    data: &'a RaceData,
    saved_at: DateTime<Utc>,
    year: u16,
    round: u8,
    version: &'a str,
}

/// Only the version tag, checked before the full record is decoded
#[derive(Deserialize)]
struct VersionEnvelope {
    version: Option<String>,
}

/// Durable key-value store for decoded races
pub trait RaceCache: Send + Sync {
    /// Stored race for `key`; stale or unreadable entries count as misses
    fn get(&self, key: RaceKey) -> BoxFuture<'_, Result<Option<RaceData>, CacheError>>;

    fn put(&self, key: RaceKey, data: Arc<RaceData>) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Removing a missing entry succeeds
    fn remove(&self, key: RaceKey) -> BoxFuture<'_, Result<(), CacheError>>;
}

/// File-per-race cache under a directory
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    version: String,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_version(dir, CACHE_VERSION)
    }

    /// Cache that reads and writes records tagged `version`
    pub fn with_version(dir: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            version: version.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: RaceKey) -> PathBuf {
        self.dir.join(format!("{}{}", key.cache_key(), FILE_SUFFIX))
    }

    /// Read the full record, purging it when stale or corrupt
    pub fn read_record(&self, key: RaceKey) -> Result<Option<CachedRaceRecord>, CacheError> {
        let path = self.path_for(key);
        let compressed = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let json = match zstd::decode_all(compressed.as_slice()) {
            Ok(json) => json,
            Err(e) => {
                warn!("Cache entry {} is not valid zstd ({}), purging", key.cache_key(), e);
                purge(&path)?;
                return Ok(None);
            }
        };

        match serde_json::from_slice::<VersionEnvelope>(&json) {
            Ok(VersionEnvelope { version: Some(v) }) if v == self.version => {}
            Ok(envelope) => {
                info!(
                    "Cache entry {} has version {:?}, expected {:?}; purging",
                    key.cache_key(),
                    envelope.version,
                    self.version
                );
                purge(&path)?;
                return Ok(None);
            }
            Err(e) => {
                warn!("Cache entry {} is corrupt ({}), purging", key.cache_key(), e);
                purge(&path)?;
                return Ok(None);
            }
        }

        match serde_json::from_slice::<CachedRaceRecord>(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Cache entry {} failed to decode ({}), purging", key.cache_key(), e);
                purge(&path)?;
                Ok(None)
            }
        }
    }

    fn write_record(&self, key: RaceKey, data: &RaceData) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;

        let record = CachedRaceRecordRef {
            data,
            saved_at: Utc::now(),
            year: key.year,
            round: key.round,
            version: &self.version,
        };
        let json = serde_json::to_vec(&record)?;
        let compressed = zstd::encode_all(json.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| CacheError::Compression(e.to_string()))?;

        // Write beside the target then rename, so readers never see a torn file
        let path = self.path_for(key);
        let tmp = path.with_extension("zst.tmp");
        std::fs::write(&tmp, &compressed)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(
            "Cached {} ({} bytes -> {} bytes)",
            key.cache_key(),
            json.len(),
            compressed.len()
        );
        Ok(())
    }
}

fn purge(path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Run blocking cache work off the async runtime
async fn blocking<T, F>(f: F) -> Result<T, CacheError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CacheError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::Io(io::Error::new(ErrorKind::Other, e.to_string())))?
}

impl RaceCache for FileCache {
    fn get(&self, key: RaceKey) -> BoxFuture<'_, Result<Option<RaceData>, CacheError>> {
        let cache = self.clone();
        async move {
            let record = blocking(move || cache.read_record(key)).await?;
            Ok(record.map(|r| r.data))
        }
        .boxed()
    }

    fn put(&self, key: RaceKey, data: Arc<RaceData>) -> BoxFuture<'_, Result<(), CacheError>> {
        let cache = self.clone();
        async move { blocking(move || cache.write_record(key, &data)).await }.boxed()
    }

    fn remove(&self, key: RaceKey) -> BoxFuture<'_, Result<(), CacheError>> {
        let path = self.path_for(key);
        async move { blocking(move || purge(&path)).await }.boxed()
    }
}
