//! TTL-keyed payload cache.
//!
//! One JSON file per key (`cache_<safe_key>.json`) plus `cache_index.json`
//! mapping each key to its expiry, so validity checks never deserialize the
//! payload itself.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{
    ensure_dir, load_json, load_json_or_default, remove_file_if_exists, safe_file_stem, save_json,
};

/// Default time-to-live for cached payloads.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

const INDEX_FILE: &str = "cache_index.json";
const ENTRY_PREFIX: &str = "cache_";

// ============================================================================
// Records
// ============================================================================

/// A persisted cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key.
    pub key: String,
    /// Cached payload.
    pub data: Value,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// Time-to-live in seconds.
    pub ttl: u64,
    /// `created_at + ttl`.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(key: &str, data: Value, ttl: u64, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            data,
            created_at: now,
            ttl,
            expires_at: expiry_after(now, ttl),
        }
    }
}

/// Index record for one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// File name of the entry, relative to the cache directory.
    pub path: String,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// Time-to-live in seconds.
    pub ttl: u64,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

impl IndexEntry {
    fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of indexed entries.
    pub total_entries: usize,
    /// Entries not yet expired.
    pub valid_entries: usize,
    /// Entries past their expiry.
    pub expired_entries: usize,
    /// Combined size of the entry files on disk.
    pub total_size_bytes: u64,
}

fn expiry_after(now: DateTime<Utc>, ttl: u64) -> DateTime<Utc> {
    i64::try_from(ttl)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================================================
// Cache Store
// ============================================================================

/// File-backed payload cache with per-entry TTL.
///
/// Reads never fail: unreadable or expired entries are evicted and reported
/// as absent. Writes log and swallow their errors.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    default_ttl: u64,
    index: Mutex<HashMap<String, IndexEntry>>,
}

impl CacheStore {
    /// Opens (or creates) a cache rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>, default_ttl: u64) -> Result<Self, StoreError> {
        let dir = dir.into();
        ensure_dir(&dir).await?;

        let index: HashMap<String, IndexEntry> = load_json_or_default(&dir.join(INDEX_FILE)).await;
        debug!(dir = %dir.display(), entries = index.len(), "Opened cache");

        Ok(Self {
            dir,
            default_ttl,
            index: Mutex::new(index),
        })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the default TTL in seconds.
    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    fn file_name(key: &str) -> String {
        let stem = safe_file_stem(key);
        // "index" is reserved for the index file.
        if stem == "index" {
            format!("{ENTRY_PREFIX}index_.json")
        } else {
            format!("{ENTRY_PREFIX}{stem}.json")
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    async fn persist_index(&self, index: &HashMap<String, IndexEntry>) {
        if let Err(e) = save_json(&self.index_path(), index).await {
            warn!(error = %e, "Failed to save cache index");
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the cached payload for `key` if present and not expired.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Utc::now()).await
    }

    /// Like [`get`](Self::get), evaluated at `now`.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let path = self.dir.join(Self::file_name(key));

        let entry: CacheEntry = match load_json(&path).await {
            Ok(entry) => entry,
            Err(e) => {
                if !e.is_not_found() {
                    warn!(key, error = %e, "Corrupt cache entry, evicting");
                }
                self.evict(key).await;
                return None;
            }
        };

        // Distinct keys can share a file stem.
        if entry.key != key {
            debug!(key, stored = %entry.key, "Cache file belongs to another key");
            return None;
        }

        if now >= entry.expires_at {
            debug!(key, expired_at = %entry.expires_at, "Cache entry expired");
            self.evict(key).await;
            return None;
        }

        debug!(key, "Cache hit");
        Some(entry.data)
    }

    /// Checks validity via the index without reading the payload.
    pub async fn is_valid(&self, key: &str) -> bool {
        self.is_valid_at(key, Utc::now()).await
    }

    /// Like [`is_valid`](Self::is_valid), evaluated at `now`.
    pub async fn is_valid_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let path = {
            let index = self.index.lock().await;
            match index.get(key) {
                Some(entry) if entry.is_live_at(now) => self.dir.join(&entry.path),
                _ => return false,
            }
        };
        tokio::fs::try_exists(&path).await.unwrap_or(false)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Stores `data` under `key` with the default TTL.
    pub async fn set(&self, key: &str, data: Value) {
        self.set_at(key, data, self.default_ttl, Utc::now()).await;
    }

    /// Stores `data` under `key` with an explicit TTL in seconds.
    pub async fn set_with_ttl(&self, key: &str, data: Value, ttl: u64) {
        self.set_at(key, data, ttl, Utc::now()).await;
    }

    /// Stores `data` as if written at `now`.
    pub async fn set_at(&self, key: &str, data: Value, ttl: u64, now: DateTime<Utc>) {
        let file_name = Self::file_name(key);
        let entry = CacheEntry::new(key, data, ttl, now);

        if let Err(e) = save_json(&self.dir.join(&file_name), &entry).await {
            warn!(key, error = %e, "Failed to write cache entry");
            return;
        }

        let mut index = self.index.lock().await;
        index.insert(
            key.to_string(),
            IndexEntry {
                path: file_name,
                created_at: entry.created_at,
                ttl,
                expires_at: entry.expires_at,
            },
        );
        self.persist_index(&index).await;
        debug!(key, ttl, "Cached payload");
    }

    /// Removes one entry. Returns true if a file was deleted.
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.evict(key).await;
        if removed {
            info!(key, "Cache entry invalidated");
        }
        removed
    }

    async fn evict(&self, key: &str) -> bool {
        let path = self.dir.join(Self::file_name(key));
        let removed = match remove_file_if_exists(&path).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key, error = %e, "Failed to remove cache entry");
                false
            }
        };

        let mut index = self.index.lock().await;
        if index.remove(key).is_some() {
            self.persist_index(&index).await;
        }
        removed
    }

    /// Removes every entry and the index. Returns the number of entry files deleted.
    ///
    /// # Errors
    ///
    /// Returns error if the cache directory cannot be listed.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let mut index = self.index.lock().await;
        let mut removed = 0;

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == INDEX_FILE || !name.starts_with(ENTRY_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            if remove_file_if_exists(&entry.path()).await? {
                removed += 1;
            }
        }

        index.clear();
        remove_file_if_exists(&self.index_path()).await?;
        info!(removed, "Cache cleared");
        Ok(removed)
    }

    /// Evicts every expired entry. Returns the number evicted.
    pub async fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now()).await
    }

    /// Like [`cleanup`](Self::cleanup), evaluated at `now`.
    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = {
            let index = self.index.lock().await;
            index
                .iter()
                .filter(|(_, entry)| !entry.is_live_at(now))
                .map(|(key, _)| key.clone())
                .collect()
        };

        for key in &expired {
            self.evict(key).await;
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired cache entries removed");
        }
        expired.len()
    }

    // ========================================================================
    // Stats
    // ========================================================================

    /// Returns cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.stats_at(Utc::now()).await
    }

    /// Like [`stats`](Self::stats), evaluated at `now`.
    pub async fn stats_at(&self, now: DateTime<Utc>) -> CacheStats {
        let entries: Vec<IndexEntry> = self.index.lock().await.values().cloned().collect();

        let mut stats = CacheStats {
            total_entries: entries.len(),
            ..CacheStats::default()
        };
        for entry in &entries {
            if entry.is_live_at(now) {
                stats.valid_entries += 1;
            } else {
                stats.expired_entries += 1;
            }
            if let Ok(meta) = tokio::fs::metadata(self.dir.join(&entry.path)).await {
                stats.total_size_bytes += meta.len();
            }
        }
        stats
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn open_temp() -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path(), DEFAULT_CACHE_TTL_SECS).await.unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_dir, cache) = open_temp().await;
        let payload = json!({"data": [{"source": "A", "revenue": 1}]});

        cache.set("sources", payload.clone()).await;

        assert_eq!(cache.get("sources").await, Some(payload));
        assert!(cache.is_valid("sources").await);
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (_dir, cache) = open_temp().await;
        let t0 = Utc::now();
        cache.set_at("k", json!({"v": 1}), 300, t0).await;

        let just_before = t0 + Duration::seconds(299);
        assert!(cache.get_at("k", just_before).await.is_some());

        let at_expiry = t0 + Duration::seconds(300);
        assert!(cache.get_at("k", at_expiry).await.is_none());

        // Evicted: absent even at an earlier instant.
        assert!(cache.get_at("k", t0).await.is_none());
        assert!(!cache.is_valid_at("k", t0).await);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_evicted() {
        let (dir, cache) = open_temp().await;
        cache.set("broken", json!({"v": 1})).await;

        let path = dir.path().join("cache_broken.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        assert!(cache.get("broken").await.is_none());
        assert!(!path.exists());
        assert!(!cache.is_valid("broken").await);
    }

    #[tokio::test]
    async fn test_is_valid_requires_backing_file() {
        let (dir, cache) = open_temp().await;
        cache.set("k", json!(1)).await;

        tokio::fs::remove_file(dir.path().join("cache_k.json")).await.unwrap();
        assert!(!cache.is_valid("k").await);
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = CacheStore::open(dir.path(), 300).await.unwrap();
            cache.set("persisted", json!({"x": true})).await;
        }
        let cache = CacheStore::open(dir.path(), 300).await.unwrap();
        assert!(cache.is_valid("persisted").await);
        assert_eq!(cache.get("persisted").await, Some(json!({"x": true})));
    }

    #[tokio::test]
    async fn test_cleanup_and_stats() {
        let (_dir, cache) = open_temp().await;
        let now = Utc::now();
        cache.set_at("old", json!(1), 10, now - Duration::seconds(60)).await;
        cache.set_at("fresh", json!(2), 300, now).await;

        let stats = cache.stats_at(now).await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.expired_entries, 1);
        assert!(stats.total_size_bytes > 0);

        assert_eq!(cache.cleanup_at(now).await, 1);
        assert_eq!(cache.stats_at(now).await.total_entries, 1);
    }

    #[tokio::test]
    async fn test_clear_and_invalidate() {
        let (dir, cache) = open_temp().await;
        cache.set("a", json!(1)).await;
        cache.set("b", json!(2)).await;

        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);

        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(cache.get("b").await.is_none());
        assert!(!dir.path().join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_reserved_index_key() {
        let (_dir, cache) = open_temp().await;
        cache.set("index", json!("payload")).await;
        cache.set("other", json!(2)).await;

        assert_eq!(cache.get("index").await, Some(json!("payload")));
        assert!(cache.is_valid("other").await);
    }

    #[tokio::test]
    async fn test_colliding_keys_do_not_share_payloads() {
        let (_dir, cache) = open_temp().await;
        cache.set("sources-today", json!("A")).await;

        assert_eq!(cache.get("sources_today").await, None);
        assert_eq!(cache.get("sources-today").await, Some(json!("A")));

        cache.set("sources_today", json!("B")).await;
        assert_eq!(cache.get("sources_today").await, Some(json!("B")));
        assert_eq!(cache.get("sources-today").await, None);
    }

    #[tokio::test]
    async fn test_set_with_ttl_overrides_default() {
        let (_dir, cache) = open_temp().await;
        cache.set_with_ttl("short", json!(1), 0).await;
        cache.set("long", json!(2)).await;

        assert!(!cache.is_valid("short").await);
        assert_eq!(cache.get("short").await, None);
        assert_eq!(cache.get("long").await, Some(json!(2)));
    }
}
