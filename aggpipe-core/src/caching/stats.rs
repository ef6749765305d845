//! Cache statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters updated by the cache store
#[derive(Debug)]
pub struct CacheStatistics {
    /// Number of lookups that found a live entry
    pub cache_hits: AtomicU64,
    /// Number of lookups that found nothing or an expired entry
    pub cache_misses: AtomicU64,
    /// Number of new keys written
    pub insertions: AtomicU64,
    /// Number of writes that replaced an existing key
    pub updates: AtomicU64,
    /// Number of entries removed by explicit deletes
    pub deletions: AtomicU64,
    /// Number of entries removed because their lifetime ended
    pub expirations: AtomicU64,
    /// Number of background sweeps completed
    pub sweeps: AtomicU64,
    start_time: Instant,
}

impl CacheStatistics {
    /// Create new statistics instance
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a cache hit
    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss
    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write; `replaced` is true when the key already existed
    pub fn record_write(&self, replaced: bool) {
        if replaced {
            self.updates.fetch_add(1, Ordering::Relaxed);
        } else {
            self.insertions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record explicit deletions
    pub fn record_deletions(&self, count: u64) {
        self.deletions.fetch_add(count, Ordering::Relaxed);
    }

    /// Record entries dropped on expiry
    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a finished sweep
    pub fn record_sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    /// Cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = hits + self.cache_misses.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Get cache uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.insertions.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
        self.deletions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.sweeps.store(0, Ordering::Relaxed);
    }

    /// Export statistics as a snapshot
    pub fn snapshot(&self) -> CacheMetrics {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        CacheMetrics {
            total_requests: cache_hits + cache_misses,
            cache_hits,
            cache_misses,
            hit_rate: self.hit_rate(),
            insertions: self.insertions.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            uptime: self.uptime(),
        }
    }
}

impl Default for CacheStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of cache counters at a point in time
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CacheMetrics {
    /// Lookups performed (hits + misses)
    pub total_requests: u64,
    /// Lookups that found a live entry
    pub cache_hits: u64,
    /// Lookups that found nothing
    pub cache_misses: u64,
    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,
    /// New keys written
    pub insertions: u64,
    /// Writes replacing an existing key
    pub updates: u64,
    /// Explicit deletions
    pub deletions: u64,
    /// Entries dropped on expiry
    pub expirations: u64,
    /// Completed sweeps
    pub sweeps: u64,
    /// Time since the store was created
    pub uptime: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStatistics::new();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_hit();
        assert_eq!(stats.hit_rate(), 1.0);

        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let stats = CacheStatistics::new();
        stats.record_write(false);
        stats.record_write(true);
        stats.record_deletions(2);
        stats.record_expirations(3);
        stats.record_hit();

        let metrics = stats.snapshot();
        assert_eq!(metrics.insertions, 1);
        assert_eq!(metrics.updates, 1);
        assert_eq!(metrics.deletions, 2);
        assert_eq!(metrics.expirations, 3);
        assert_eq!(metrics.total_requests, 1);

        stats.reset();
        assert_eq!(stats.snapshot().insertions, 0);
    }
}
