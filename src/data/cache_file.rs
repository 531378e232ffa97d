use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{DEBUG_FLAGS, PERSISTENCE, vintage_cache_filename};
use crate::data::source::{Fetched, Origin, VintageSource};
use crate::domain::VintageId;
use crate::error::FetchError;
use crate::utils::time_utils::{epoch_ms_to_utc, how_many_seconds_ago};

/// Serialized wrapper around one raw vintage file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheEntry {
    pub version: f64,
    pub timestamp_ms: i64,
    pub id: VintageId,
    pub bytes: Vec<u8>,
}

impl CacheEntry {
    pub fn new(id: VintageId, bytes: Vec<u8>) -> Self {
        Self {
            version: PERSISTENCE.cache.version,
            timestamp_ms: Utc::now().timestamp_millis(),
            id,
            bytes,
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).context(format!("Failed to open cache file: {:?}", path))?;
        let mut reader = BufReader::new(file);
        let entry = bincode::deserialize_from(&mut reader)
            .context(format!("Failed to deserialize cache: {:?}", path))?;
        Ok(entry)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
        let file =
            File::create(path).context(format!("Failed to create file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .context(format!("Failed to serialize cache to: {}", path.display()))
    }
}

/// Load and validate the cached entry for `id`. Any mismatch counts as missing.
pub fn load_valid_entry(directory: &Path, id: VintageId) -> Result<CacheEntry> {
    let path = directory.join(vintage_cache_filename(id));
    let entry = CacheEntry::load_from_path(&path)?;

    if entry.version != PERSISTENCE.cache.version {
        bail!(
            "Cache version mismatch: file v{} vs required v{}",
            entry.version,
            PERSISTENCE.cache.version
        );
    }
    if entry.id != id {
        bail!("Cache file {:?} holds {} instead of {}", path, entry.id, id);
    }
    Ok(entry)
}

/// Raw-file cache layered in front of another source.
///
/// Policy: trust the cache unless the release is missing (or unreadable).
/// With no inner source the cache works offline and reports `NotCached`.
pub struct CachedSource {
    directory: PathBuf,
    inner: Option<Box<dyn VintageSource>>,
    refresh: bool,
}

impl CachedSource {
    pub fn new(directory: impl Into<PathBuf>, inner: Box<dyn VintageSource>) -> Self {
        Self {
            directory: directory.into(),
            inner: Some(inner),
            refresh: false,
        }
    }

    pub fn offline(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            inner: None,
            refresh: false,
        }
    }

    /// Ignore existing entries and refetch (entries are still rewritten).
    pub fn refreshing(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn read(&self, id: VintageId) -> Option<CacheEntry> {
        let directory = self.directory.clone();
        let loaded = tokio::task::spawn_blocking(move || load_valid_entry(&directory, id)).await;
        match loaded {
            Ok(Ok(entry)) => {
                if DEBUG_FLAGS.print_cache_events {
                    log::info!(
                        "Cache hit for {} (written {}, {}s ago)",
                        id,
                        epoch_ms_to_utc(entry.timestamp_ms),
                        how_many_seconds_ago(entry.timestamp_ms)
                    );
                }
                Some(entry)
            }
            Ok(Err(e)) => {
                if DEBUG_FLAGS.print_cache_events {
                    log::info!("Cache miss for {}: {:#}", id, e);
                }
                None
            }
            Err(e) => {
                log::error!("Cache read task for {} panicked: {}", id, e);
                None
            }
        }
    }

    async fn write(&self, id: VintageId, bytes: Vec<u8>) {
        let path = self.directory.join(vintage_cache_filename(id));
        let written = tokio::task::spawn_blocking(move || CacheEntry::new(id, bytes).save_to_path(&path))
            .await
            .context("Cache write task panicked");
        match written {
            Ok(Ok(())) => {
                if DEBUG_FLAGS.print_cache_events {
                    log::info!("✅ Cached {}", id);
                }
            }
            Ok(Err(e)) | Err(e) => log::error!("⚠️  Failed to write cache for {}: {:#}", id, e),
        }
    }
}

#[async_trait]
impl VintageSource for CachedSource {
    fn signature(&self) -> &'static str {
        "Local Cache"
    }

    async fn fetch_vintage(&self, id: VintageId) -> Result<Fetched, FetchError> {
        if !self.refresh {
            if let Some(entry) = self.read(id).await {
                return Ok(Fetched {
                    bytes: entry.bytes,
                    origin: Origin::Cache,
                });
            }
        }

        let Some(inner) = &self.inner else {
            return Err(FetchError::NotCached);
        };
        let fetched = inner.fetch_vintage(id).await?;
        self.write(id, fetched.bytes.clone()).await;
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::MemorySource;

    #[tokio::test]
    async fn test_fetch_then_serve_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let inner = MemorySource::new().with_file(VintageId(7), "payload");
        let cached = CachedSource::new(dir.path(), Box::new(inner));

        let first = cached.fetch_vintage(VintageId(7)).await.unwrap();
        assert_eq!(first.origin, Origin::Memory);

        let second = cached.fetch_vintage(VintageId(7)).await.unwrap();
        assert_eq!(second.origin, Origin::Cache);
        assert_eq!(second.bytes, b"payload".to_vec());
    }

    #[tokio::test]
    async fn test_offline_cache_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let offline = CachedSource::offline(dir.path());
        assert_eq!(
            offline.fetch_vintage(VintageId(1)).await.unwrap_err(),
            FetchError::NotCached
        );
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        CacheEntry::new(VintageId(2), b"stale".to_vec())
            .save_to_path(&dir.path().join(vintage_cache_filename(VintageId(2))))
            .unwrap();

        let inner = MemorySource::new().with_file(VintageId(2), "fresh");
        let cached = CachedSource::new(dir.path(), Box::new(inner)).refreshing(true);
        let fetched = cached.fetch_vintage(VintageId(2)).await.unwrap();
        assert_eq!(fetched.bytes, b"fresh".to_vec());

        let entry = load_valid_entry(dir.path(), VintageId(2)).unwrap();
        assert_eq!(entry.bytes, b"fresh".to_vec());
    }

    #[test]
    fn test_mismatched_id_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        CacheEntry::new(VintageId(9), b"x".to_vec())
            .save_to_path(&dir.path().join(vintage_cache_filename(VintageId(3))))
            .unwrap();
        assert!(load_valid_entry(dir.path(), VintageId(3)).is_err());
    }
}
