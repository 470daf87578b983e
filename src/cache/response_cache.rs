use crate::cache::CacheError;
use crate::config::CacheConfig;
use crate::crawler::ScrapeResult;
use crate::url::normalize_url;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// A cached scrape result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 hex of the normalized URL
    pub key: String,
    pub url: String,
    pub payload: ScrapeResult,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) >= ttl
    }
}

/// Computes the cache key for a URL
///
/// URLs are normalized first so trivially different spellings of the same
/// page share an entry. Unparseable URLs are hashed as given.
pub fn cache_key(url: &str) -> String {
    let normalized = normalize_url(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string());
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// TTL cache of scrape results with LRU bound and optional disk layer
///
/// Reads clone the entry while holding the lock, so a concurrent eviction can
/// never hand out a half-removed entry.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    capacity: NonZeroUsize,
    ttl: Duration,
    directory: Option<PathBuf>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize, directory: Option<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            ttl,
            directory,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.ttl_secs),
            config.max_entries,
            config.directory.as_ref().map(PathBuf::from),
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Looks up a fresh result for `url`
    ///
    /// Memory is consulted first; on a miss the disk layer is read and a fresh
    /// hit is promoted back into memory. Expired entries are removed.
    pub async fn get(&self, url: &str) -> Option<ScrapeResult> {
        let key = cache_key(url);
        let now = Utc::now();

        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get(&key) {
                if !entry.is_expired(self.ttl, now) {
                    return Some(entry.payload.clone());
                }
                entries.pop(&key);
                debug!("Cache entry for {} expired", url);
            }
        }

        let entry = self.read_disk(&key).await?;
        if entry.is_expired(self.ttl, now) {
            self.remove_disk(&key).await;
            return None;
        }

        let payload = entry.payload.clone();
        self.entries.lock().put(key, entry);
        Some(payload)
    }

    /// Stores a result for `url`, replacing any previous entry
    pub async fn put(&self, url: &str, payload: &ScrapeResult) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: cache_key(url),
            url: url.to_string(),
            payload: payload.clone(),
            cached_at: Utc::now(),
        };

        if self.directory.is_some() {
            self.write_disk(&entry).await?;
        }

        self.entries.lock().put(entry.key.clone(), entry);
        Ok(())
    }

    /// Removes expired in-memory entries and returns how many were dropped
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Removes expired files from the disk layer
    pub async fn evict_expired_disk(&self) -> Result<usize, CacheError> {
        let Some(directory) = &self.directory else {
            return Ok(0);
        };
        if !directory.exists() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut removed = 0;
        let mut dir = fs::read_dir(directory).await?;

        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let expired = match read_entry(&path).await {
                Ok(entry) => entry.is_expired(self.ttl, now),
                Err(e) => {
                    warn!("Dropping unreadable cache file {:?}: {}", path, e);
                    true
                }
            };

            if expired {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Keeps only the `target` most recently used in-memory entries
    ///
    /// The map is shrunk in place and then given its normal capacity back,
    /// which releases the memory held by evicted slots.
    pub fn shrink_to(&self, target: usize) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let target = NonZeroUsize::new(target).unwrap_or(NonZeroUsize::MIN);

        entries.resize(target);
        entries.resize(self.capacity);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        self.directory
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", key)))
    }

    async fn read_disk(&self, key: &str) -> Option<CacheEntry> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return None;
        }

        match read_entry(&path).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Ignoring unreadable cache file {:?}: {}", path, e);
                None
            }
        }
    }

    async fn write_disk(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let (Some(directory), Some(path)) = (&self.directory, self.path_for(&entry.key)) else {
            return Ok(());
        };

        fs::create_dir_all(directory).await?;
        let json = serde_json::to_vec(entry)?;

        // Write atomically using a temp file
        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    async fn remove_disk(&self, key: &str) {
        if let Some(path) = self.path_for(key) {
            if let Err(e) = fs::remove_file(&path).await {
                debug!("Could not remove cache file {:?}: {}", path, e);
            }
        }
    }
}

async fn read_entry(path: &Path) -> Result<CacheEntry, CacheError> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
