//! Process-local key/value store with per-entry TTL
//!
//! Expiry is enforced lazily on every read and eagerly by a periodic sweep.
//! The sweep scans under the read lock and deletes in bounded batches under
//! the write lock, re-checking each key so entries refreshed in between are
//! kept.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::stats::{CacheMetrics, CacheStatistics};
use super::{CacheConfig, CacheEntry, CacheError, CacheResult};

/// Point-in-time view of the store contents
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CacheStoreStats {
    /// Entries currently held, expired or not
    pub total_entries: usize,
    /// Entries past their lifetime that have not been removed yet
    pub expired_entries: usize,
    /// Rough memory estimate for keys, values and entry overhead
    pub approx_memory_bytes: usize,
    /// Age of the oldest entry in milliseconds, 0 when empty
    pub oldest_entry_ms: u64,
}

/// Shared TTL cache
#[derive(Debug)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    statistics: CacheStatistics,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CacheStore {
    /// Create a store with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            statistics: CacheStatistics::new(),
        }
    }

    /// Configuration in effect
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether the store accepts writes. A disabled store never holds entries.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Look up a live value.
    ///
    /// An expired entry found here is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if !self.is_enabled() {
            return None;
        }

        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired_at(now) => {
                    self.statistics.record_hit();
                    tracing::debug!(key = %key, "cache hit");
                    return Some(entry.value.clone());
                },
                Some(_) => {},
                None => {
                    self.statistics.record_miss();
                    tracing::debug!(key = %key, "cache miss");
                    return None;
                },
            }
        }

        // Expired: drop it unless a writer refreshed it since the read above.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired_at(Instant::now()) {
                self.statistics.record_hit();
                return Some(entry.value.clone());
            }
            entries.remove(key);
            self.statistics.record_expirations(1);
        }
        self.statistics.record_miss();
        tracing::debug!(key = %key, "cache miss (expired)");
        None
    }

    /// Look up a live value and deserialize it.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Store a value. `None` uses the configured default lifetime.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value, ttl: Option<Duration>) {
        if !self.is_enabled() {
            return;
        }

        let key = key.into();
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let replaced = self
            .entries
            .write()
            .insert(key.clone(), CacheEntry::new(value, ttl))
            .is_some();
        self.statistics.record_write(replaced);
        tracing::debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache set");
    }

    /// Serialize and store a value.
    pub fn set_as<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl);
        Ok(())
    }

    /// Whether a live entry exists. Does not count as a lookup.
    pub fn has(&self, key: &str) -> bool {
        self.entries
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Remove a key. Returns true when something was removed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            self.statistics.record_deletions(1);
            tracing::debug!(key = %key, "cache delete");
        }
        removed
    }

    /// Remove every key starting with `prefix`. Returns the number removed.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        self.statistics.record_deletions(removed as u64);
        removed
    }

    /// Remove everything.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        self.statistics.record_deletions(removed as u64);
        tracing::debug!(removed, "cache cleared");
    }

    /// Number of entries held, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entry counts and memory estimate.
    pub fn stats(&self) -> CacheStoreStats {
        let now = Instant::now();
        let entries = self.entries.read();
        let mut stats = CacheStoreStats {
            total_entries: entries.len(),
            ..Default::default()
        };
        for (key, entry) in entries.iter() {
            if entry.is_expired_at(now) {
                stats.expired_entries += 1;
            }
            stats.approx_memory_bytes += entry.approx_size(key);
            stats.oldest_entry_ms = stats.oldest_entry_ms.max(entry.age().as_millis() as u64);
        }
        stats
    }

    /// Hit, miss and write counters.
    pub fn metrics(&self) -> CacheMetrics {
        self.statistics.snapshot()
    }

    /// Zero the counters without touching stored entries.
    pub fn reset_metrics(&self) {
        self.statistics.reset();
    }

    /// Remove expired entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        if expired.is_empty() {
            self.statistics.record_sweep();
            return 0;
        }

        let batch_size = self.config.sweep_batch_size.max(1);
        let mut removed = 0;
        for batch in expired.chunks(batch_size) {
            let mut entries = self.entries.write();
            let now = Instant::now();
            for key in batch {
                if entries.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
                    entries.remove(key);
                    removed += 1;
                }
            }
        }

        self.statistics.record_expirations(removed as u64);
        self.statistics.record_sweep();
        tracing::debug!(removed, candidates = expired.len(), "cache sweep finished");
        removed
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` on the
    /// current tokio runtime.
    ///
    /// Fails on a zero interval or when called outside a runtime. The task
    /// holds a weak reference, so it also ends when the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> CacheResult<SweeperHandle> {
        if interval.is_zero() {
            return Err(CacheError::Configuration(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        let runtime = Handle::try_current().map_err(|e| CacheError::Runtime(e.to_string()))?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store: Weak<Self> = Arc::downgrade(self);

        let task = runtime.spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        store.sweep_expired();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("cache sweeper stopped");
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, "cache sweeper started");
        Ok(SweeperHandle { shutdown_tx, task })
    }
}

/// Handle to a running sweeper task
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "cache sweeper ended abnormally");
        }
    }

    /// Whether the task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = CacheStore::default();
        store.set("k", json!({ "v": 1 }), Some(Duration::from_millis(50)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.get("k"), Some(json!({ "v": 1 })));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get("k"), None);
        assert_eq!(store.len(), 0, "expired entry removed on read");
        assert_eq!(store.metrics().expirations, 1);
    }

    #[test]
    fn test_default_ttl_applies() {
        let store = CacheStore::default();
        store.set("k", json!(1), None);
        let ttl = store.entries.read().get("k").map(|e| e.ttl);
        assert_eq!(ttl, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_has_delete_clear() {
        let store = CacheStore::default();
        store.set("a", json!(1), None);
        store.set("b", json!(2), None);

        assert!(store.has("a"));
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert!(!store.has("a"));

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get("b"), None);
    }

    #[test]
    fn test_delete_prefix() {
        let store = CacheStore::default();
        store.set("TaskService.list:1", json!(1), None);
        store.set("TaskService.list:2", json!(2), None);
        store.set("TaskService.get:1", json!(3), None);

        assert_eq!(store.delete_prefix("TaskService.list:"), 2);
        assert!(store.has("TaskService.get:1"));
    }

    #[test]
    fn test_typed_roundtrip_and_mismatch() {
        let store = CacheStore::default();
        store.set_as("ids", &vec![1u32, 2, 3], None).unwrap();
        let ids: Option<Vec<u32>> = store.get_as("ids").unwrap();
        assert_eq!(ids, Some(vec![1, 2, 3]));

        let wrong: CacheResult<Option<String>> = store.get_as("ids");
        assert!(wrong.is_err());
    }

    #[test]
    fn test_disabled_store_holds_nothing() {
        let store = CacheStore::new(CacheConfig::builder().enabled(false).build());
        store.set("k", json!(1), None);
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_sweep() {
        let store = CacheStore::new(CacheConfig::builder().sweep_batch_size(2).build());
        for i in 0..5 {
            store.set(format!("short{i}"), json!(i), Some(Duration::from_millis(5)));
        }
        store.set("long", json!("kept"), Some(Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_millis(20)).await;

        let stats = store.stats();
        assert_eq!(stats.total_entries, 6);
        assert_eq!(stats.expired_entries, 5);
        assert!(stats.approx_memory_bytes > 0);

        assert_eq!(store.sweep_expired(), 5);
        assert_eq!(store.len(), 1);
        assert!(store.has("long"));
        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn test_hit_miss_counters() {
        let store = CacheStore::default();
        store.set("k", json!(1), None);
        store.get("k");
        store.get("missing");

        let metrics = store.metrics();
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.insertions, 1);
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_shuts_down() {
        let store = Arc::new(CacheStore::default());
        store.set("k", json!(1), Some(Duration::from_millis(5)));

        let handle = store.spawn_sweeper(Duration::from_millis(20)).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.len(), 0);
        assert!(store.metrics().sweeps >= 1);

        handle.shutdown().await;
    }

    #[test]
    fn test_reset_metrics_keeps_entries() {
        let store = CacheStore::default();
        store.set("k", json!(1), None);
        assert_eq!(store.get("k"), Some(json!(1)));
        assert_eq!(store.metrics().cache_hits, 1);

        store.reset_metrics();
        assert_eq!(store.metrics().cache_hits, 0);
        assert_eq!(store.metrics().insertions, 0);
        assert!(store.has("k"));
        assert!(store.stats().oldest_entry_ms < 60_000);
    }

    #[tokio::test]
    async fn test_sweeper_rejects_zero_interval() {
        let store = Arc::new(CacheStore::default());
        let err = store.spawn_sweeper(Duration::ZERO).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_sweeper_requires_runtime() {
        let store = Arc::new(CacheStore::default());
        let err = store.spawn_sweeper(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CacheError::Runtime(_)));
    }
}
