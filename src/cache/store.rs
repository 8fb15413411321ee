//! In-memory TTL cache with asynchronous snapshot persistence
//!
//! Provides a `CacheStore` that holds JSON-shaped values with expiry timestamps
//! and writes the entire cache to a single snapshot file without blocking the
//! caller. Persistence failures are logged and swallowed: the cache stays
//! usable even when its disk backing is unavailable.

use chrono::Utc;
use directories::ProjectDirs;
use log::{debug, error, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// File name of the snapshot inside the cache directory
const SNAPSHOT_FILE: &str = "ai-cache.json";

/// Wrapper struct for cached data, both in memory and on disk
///
/// The serde field names match the snapshot wire format: a JSON object
/// mapping cache keys to `{ "data": ..., "expiresAt": <epoch-ms> }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    /// The cached value
    data: Value,
    /// Expiry timestamp in epoch milliseconds
    #[serde(rename = "expiresAt")]
    expires_at: i64,
}

impl CacheEntry {
    /// An entry written with `ttl_seconds = 0` has `expires_at == now` and
    /// must already read as expired in that same millisecond, hence `>=`.
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Result of reading an entry together with its freshness
///
/// Returned by [`CacheStore::lookup`] so a caller can distinguish a fresh
/// value from one it may only serve as degraded fallback content.
#[derive(Debug, Clone)]
pub struct CachedData<T> {
    /// The cached value
    pub data: T,
    /// Whether the entry's TTL had already elapsed when it was read
    pub is_expired: bool,
}

/// Cache statistics returned by [`CacheStore::stats`]
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of entries currently held, including expired ones not yet reaped
    pub size: usize,
    /// All keys currently held
    pub keys: Vec<String>,
}

/// In-memory key/value store with TTL expiry and background disk snapshots
///
/// Entries expire lazily: an expired entry is removed the first time it is
/// read without `ignore_expiry`. Reading with `ignore_expiry = true` returns
/// the value regardless of freshness and never deletes, which is how callers
/// retrieve "last known good" content as a degraded fallback.
///
/// Every mutation schedules a full snapshot write to disk. Snapshot writes
/// are serialized by an async lock so a later snapshot can never be clobbered
/// by an earlier in-flight one, and each write goes through a temp file plus
/// rename so a torn write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Live entries, shared with background snapshot tasks
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    /// Full path of the snapshot file
    snapshot_path: PathBuf,
    /// Serializes snapshot writes for this store
    writer: Arc<tokio::sync::Mutex<()>>,
}

impl CacheStore {
    /// Creates a new CacheStore using the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/pitwall/` on Linux, or the equivalent path on other
    /// platforms. Returns `None` if the cache directory cannot be determined
    /// (e.g., no home directory). An existing snapshot is loaded; entries
    /// that have already expired are dropped during the load.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "pitwall")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a new CacheStore rooted at a specific directory
    ///
    /// Useful for testing or when deployment dictates the snapshot location.
    /// Loads an existing snapshot from the directory if one is present; a
    /// corrupt or unreadable snapshot yields an empty cache, never an error.
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        let snapshot_path = cache_dir.join(SNAPSHOT_FILE);
        let entries = load_snapshot(&snapshot_path);
        Self {
            entries: Arc::new(Mutex::new(entries)),
            snapshot_path,
            writer: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Reads a value from the cache
    ///
    /// With `ignore_expiry = false`, an expired entry is deleted as a side
    /// effect and `None` is returned. With `ignore_expiry = true` the value
    /// is returned regardless of freshness and nothing is deleted.
    ///
    /// A stored value that no longer deserializes into `T` is treated as
    /// absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str, ignore_expiry: bool) -> Option<T> {
        let value = {
            let Ok(mut entries) = self.entries.lock() else {
                return None;
            };
            let entry = entries.get(key)?;
            let expired = entry.is_expired(now_ms());
            let data = entry.data.clone();
            if !ignore_expiry && expired {
                entries.remove(key);
                debug!("cache key expired: {key}");
                return None;
            }
            data
        };

        match serde_json::from_value(value) {
            Ok(typed) => {
                debug!("cache hit: {key}");
                Some(typed)
            }
            Err(err) => {
                warn!("cached value under {key} no longer matches the requested type: {err}");
                None
            }
        }
    }

    /// Reads an entry and its freshness in a single pass
    ///
    /// Like a plain `get`, an expired entry is removed from the cache as a
    /// side effect, but its value is still returned with `is_expired = true`
    /// so the caller can serve it as last-known-good content without a
    /// second read.
    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        let (value, is_expired) = {
            let Ok(mut entries) = self.entries.lock() else {
                return None;
            };
            let entry = entries.get(key)?;
            let expired = entry.is_expired(now_ms());
            let data = entry.data.clone();
            if expired {
                entries.remove(key);
                debug!("cache key expired: {key}");
            }
            (data, expired)
        };

        match serde_json::from_value(value) {
            Ok(data) => Some(CachedData {
                data,
                is_expired,
            }),
            Err(err) => {
                warn!("cached value under {key} no longer matches the requested type: {err}");
                None
            }
        }
    }

    /// Writes a value to the cache with a TTL in seconds
    ///
    /// Overwrites any existing entry. A `ttl_seconds <= 0` stores an entry
    /// that is already expired on the next plain `get`, while remaining
    /// readable with `ignore_expiry = true`; the orchestrator's stale paths
    /// rely on this.
    ///
    /// Schedules a full snapshot write in the background; the caller is never
    /// blocked on disk I/O and persistence failures are only logged. Outside
    /// a tokio runtime the snapshot is skipped and the entry lives in memory
    /// only.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: i64) {
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to serialize value for cache key {key}: {err}");
                return;
            }
        };

        let entry = CacheEntry {
            data,
            expires_at: now_ms() + ttl_seconds * 1000,
        };

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), entry);
        }
        debug!("cached key: {key} (TTL: {ttl_seconds}s)");

        self.schedule_snapshot();
    }

    /// Returns whether a key exists and is still fresh
    ///
    /// Equivalent to a plain `get`, including the lazy removal of an expired
    /// entry.
    pub fn has(&self, key: &str) -> bool {
        self.get::<Value>(key, false).is_some()
    }

    /// Removes a single entry
    pub fn delete(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
        debug!("deleted cache key: {key}");
    }

    /// Removes all entries and snapshots the now-empty cache
    ///
    /// Like `set`, the snapshot write happens in the background and is
    /// skipped outside a tokio runtime.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
        debug!("cache cleared");
        self.schedule_snapshot();
    }

    /// Returns the current size and key set
    pub fn stats(&self) -> CacheStats {
        match self.entries.lock() {
            Ok(entries) => CacheStats {
                size: entries.len(),
                keys: entries.keys().cloned().collect(),
            },
            Err(_) => CacheStats {
                size: 0,
                keys: Vec::new(),
            },
        }
    }

    /// Writes a snapshot immediately and waits for it to complete
    ///
    /// Background snapshot tasks scheduled by `set`/`clear` hold the same
    /// writer lock, so after `flush` returns the snapshot on disk reflects at
    /// least the state at the time of the call. Intended for shutdown and
    /// tests; normal operation never needs to wait on persistence.
    pub async fn flush(&self) {
        let _guard = self.writer.lock().await;
        let snapshot = self.capture();
        if let Err(err) = write_snapshot(&self.snapshot_path, &snapshot).await {
            error!("failed to persist cache snapshot: {err}");
        }
    }

    /// Clones the current entries for serialization
    fn capture(&self) -> HashMap<String, CacheEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Spawns a fire-and-forget snapshot write
    ///
    /// The writer lock is acquired before the entries are captured, so a
    /// snapshot scheduled after a mutation always contains that mutation even
    /// when an earlier write is still in flight.
    ///
    /// Outside a tokio runtime the snapshot is skipped with a warning; the
    /// in-memory mutation has already happened and the cache stays usable.
    fn schedule_snapshot(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available, skipping cache snapshot");
            return;
        };
        let store = self.clone();
        handle.spawn(async move {
            let _guard = store.writer.lock().await;
            let snapshot = store.capture();
            if let Err(err) = write_snapshot(&store.snapshot_path, &snapshot).await {
                error!("failed to persist cache snapshot: {err}");
            }
        });
    }
}

/// Returns the current time in epoch milliseconds
fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Loads a snapshot from disk, dropping entries that have already expired
///
/// Missing, unreadable, or corrupt snapshots all yield an empty cache; the
/// cache must come up usable regardless of the state of its disk backing.
fn load_snapshot(path: &Path) -> HashMap<String, CacheEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                debug!("no cache snapshot at {}, starting empty", path.display());
            } else {
                warn!("failed to read cache snapshot {}: {err}", path.display());
            }
            return HashMap::new();
        }
    };

    let parsed: HashMap<String, CacheEntry> = match serde_json::from_str(&content) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("corrupt cache snapshot {}: {err}", path.display());
            return HashMap::new();
        }
    };

    let now = now_ms();
    let total = parsed.len();
    let entries: HashMap<String, CacheEntry> = parsed
        .into_iter()
        .filter(|(_, entry)| !entry.is_expired(now))
        .collect();
    debug!(
        "loaded {} cached responses from disk ({} expired entries skipped)",
        entries.len(),
        total - entries.len()
    );
    entries
}

/// Writes the snapshot atomically: temp file in the same directory, then rename
async fn write_snapshot(
    path: &Path,
    snapshot: &HashMap<String, CacheEntry>,
) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await?;
    tokio::fs::rename(&tmp_path, path).await?;

    debug!("persisted {} cache entries to disk", snapshot.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestPayload {
        headline: String,
        score: i32,
    }

    fn payload(headline: &str, score: i32) -> TestPayload {
        TestPayload {
            headline: headline.to_string(),
            score,
        }
    }

    fn create_test_store() -> (CacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = CacheStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_get_returns_value_before_expiry() {
        let (store, _temp_dir) = create_test_store();
        let data = payload("fresh", 1);

        store.set("news:f1", &data, 3600);

        let result: TestPayload = store.get("news:f1", false).expect("Should hit fresh entry");
        assert_eq!(result, data);
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();

        let result: Option<TestPayload> = store.get("nonexistent", false);

        assert!(result.is_none(), "Should return None for missing key");
    }

    #[tokio::test]
    async fn test_non_positive_ttl_is_immediately_expired() {
        let (store, _temp_dir) = create_test_store();
        let data = payload("stale", 2);

        store.set("bio:44", &data, -1);

        let fresh: Option<TestPayload> = store.get("bio:44", false);
        assert!(fresh.is_none(), "Entry with negative TTL should read as expired");
    }

    #[tokio::test]
    async fn test_zero_ttl_is_immediately_expired() {
        let (store, _temp_dir) = create_test_store();
        let data = payload("zero", 0);

        store.set("bio:44", &data, 0);

        // Even when the read lands in the same millisecond as the write, a
        // zero TTL must read as absent.
        let fresh: Option<TestPayload> = store.get("bio:44", false);
        assert!(fresh.is_none(), "Entry with zero TTL should read as expired");
    }

    #[tokio::test]
    async fn test_zero_ttl_still_readable_ignoring_expiry() {
        let (store, _temp_dir) = create_test_store();
        let data = payload("zero", 0);

        store.set("bio:44", &data, 0);

        let stale: TestPayload = store
            .get("bio:44", true)
            .expect("ignore_expiry should return the zero-TTL value");
        assert_eq!(stale, data);
    }

    #[tokio::test]
    async fn test_ignore_expiry_returns_expired_value() {
        let (store, _temp_dir) = create_test_store();
        let data = payload("stale", 3);

        store.set("bio:44", &data, -1);

        let stale: TestPayload = store
            .get("bio:44", true)
            .expect("ignore_expiry should return the expired value");
        assert_eq!(stale, data);
    }

    #[tokio::test]
    async fn test_expired_read_deletes_entry() {
        let (store, _temp_dir) = create_test_store();
        store.set("preview:monza", &payload("old", 4), -1);

        let before = store.stats();
        assert!(before.keys.contains(&"preview:monza".to_string()));

        let _: Option<TestPayload> = store.get("preview:monza", false);

        let after = store.stats();
        assert_eq!(after.size, 0, "Expired read should remove the entry");
        assert!(!after.keys.contains(&"preview:monza".to_string()));
    }

    #[tokio::test]
    async fn test_ignore_expiry_read_does_not_delete() {
        let (store, _temp_dir) = create_test_store();
        store.set("preview:monza", &payload("old", 4), -1);

        let _: Option<TestPayload> = store.get("preview:monza", true);

        let stats = store.stats();
        assert_eq!(stats.size, 1, "ignore_expiry read must not reap the entry");
    }

    #[tokio::test]
    async fn test_lookup_reports_fresh_entry() {
        let (store, _temp_dir) = create_test_store();
        let data = payload("fresh", 1);
        store.set("news:f1", &data, 3600);

        let found: CachedData<TestPayload> =
            store.lookup("news:f1").expect("Should find the entry");

        assert_eq!(found.data, data);
        assert!(!found.is_expired);
        assert_eq!(store.stats().size, 1, "Fresh lookup must not remove the entry");
    }

    #[tokio::test]
    async fn test_lookup_returns_expired_value_and_reaps_it() {
        let (store, _temp_dir) = create_test_store();
        let data = payload("stale", 2);
        store.set("news:f1", &data, -1);

        let found: CachedData<TestPayload> =
            store.lookup("news:f1").expect("Expired value should still come back");

        assert_eq!(found.data, data);
        assert!(found.is_expired);
        assert_eq!(store.stats().size, 0, "Expired lookup reaps like a plain get");
    }

    #[test]
    fn test_set_outside_runtime_caches_without_panicking() {
        // Plain #[test]: there is no tokio runtime here, so the snapshot is
        // skipped but the in-memory write must still land.
        let (store, _temp_dir) = create_test_store();
        store.set("news:f1", &payload("sync", 1), 3600);

        assert!(store.has("news:f1"));
        store.clear();
        assert_eq!(store.stats().size, 0);
    }

    #[tokio::test]
    async fn test_has_reflects_freshness() {
        let (store, _temp_dir) = create_test_store();
        store.set("fresh", &payload("a", 1), 3600);
        store.set("expired", &payload("b", 2), -1);

        assert!(store.has("fresh"));
        assert!(!store.has("expired"));
    }

    #[tokio::test]
    async fn test_overwrite_existing_entry() {
        let (store, _temp_dir) = create_test_store();
        store.set("standings:2024", &payload("first", 1), 3600);
        store.set("standings:2024", &payload("second", 2), 3600);

        let result: TestPayload = store.get("standings:2024", false).expect("Should read");
        assert_eq!(result, payload("second", 2));
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let (store, _temp_dir) = create_test_store();
        store.set("news:f1", &payload("gone", 1), 3600);

        store.delete("news:f1");

        assert!(!store.has("news:f1"));
        assert_eq!(store.stats().size, 0);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip_drops_expired_entries() {
        let (store, temp_dir) = create_test_store();
        store.set("keep:1", &payload("a", 1), 3600);
        store.set("keep:2", &payload("b", 2), 3600);
        store.set("drop:1", &payload("c", 3), -1);
        store.flush().await;

        let reloaded = CacheStore::with_dir(temp_dir.path().to_path_buf());

        let stats = reloaded.stats();
        assert_eq!(stats.size, 2, "Expired entries must be dropped during load");
        assert!(reloaded.has("keep:1"));
        assert!(reloaded.has("keep:2"));
        assert!(!reloaded.has("drop:1"));
    }

    #[tokio::test]
    async fn test_snapshot_uses_wire_field_names() {
        let (store, temp_dir) = create_test_store();
        store.set("news:f1", &payload("wire", 7), 3600);
        store.flush().await;

        let content = std::fs::read_to_string(temp_dir.path().join("ai-cache.json"))
            .expect("Snapshot file should exist");
        assert!(content.contains("\"expiresAt\""));
        assert!(content.contains("\"data\""));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_loads_as_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::write(temp_dir.path().join("ai-cache.json"), "{not json at all")
            .expect("Should write corrupt snapshot");

        let store = CacheStore::with_dir(temp_dir.path().to_path_buf());

        assert_eq!(store.stats().size, 0, "Corrupt snapshot should load as empty");
    }

    #[tokio::test]
    async fn test_clear_persists_empty_snapshot() {
        let (store, temp_dir) = create_test_store();
        store.set("news:f1", &payload("a", 1), 3600);
        store.flush().await;

        store.clear();
        store.flush().await;

        let reloaded = CacheStore::with_dir(temp_dir.path().to_path_buf());
        assert_eq!(reloaded.stats().size, 0);
    }

    #[tokio::test]
    async fn test_flush_creates_missing_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested = temp_dir.path().join("nested").join("cache");
        let store = CacheStore::with_dir(nested.clone());

        store.set("news:f1", &payload("a", 1), 3600);
        store.flush().await;

        assert!(nested.join("ai-cache.json").exists());
    }

    #[tokio::test]
    async fn test_wrong_type_reads_as_absent() {
        let (store, _temp_dir) = create_test_store();
        store.set("news:f1", &payload("typed", 1), 3600);

        let result: Option<Vec<u8>> = store.get("news:f1", false);

        assert!(result.is_none(), "Type mismatch should read as absent");
    }
}
