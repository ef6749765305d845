//! Result caching for pipelines and service methods
//!
//! This module provides a process-local key/value store with per-entry
//! time-to-live, deterministic key generation, and composable wrappers that
//! add read-through caching, post-success invalidation and timing to any
//! async operation.
//!
//! ## Features
//!
//! - **TTL store**: lazy expiry on read plus a batched background sweep
//! - **Deterministic keys**: canonical JSON hashed with SHA-256
//! - **Read-through caching**: failures are never cached
//! - **Invalidation**: keys removed only after the wrapped call succeeds
//! - **Statistics**: hit/miss/insert/expire counters with snapshots
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use aggpipe_core::caching::{operation, CacheStore, MethodCacheOptions, OperationExt};
//!
//! # async fn example() -> aggpipe_core::Result<()> {
//! let store = Arc::new(CacheStore::default());
//!
//! let count_open = operation("TaskService", "count_open", |project: String| async move {
//!     Ok::<u64, aggpipe_core::AggPipeError>(project.len() as u64)
//! })
//! .cached(store.clone(), MethodCacheOptions::with_ttl(Duration::from_secs(60)));
//!
//! use aggpipe_core::caching::Operation;
//! let first = count_open.call("p1".to_string()).await?; // executes
//! let second = count_open.call("p1".to_string()).await?; // served from the store
//! assert_eq!(first, second);
//! # Ok(())
//! # }
//! ```

pub mod cache_config;
pub mod cache_key;
pub mod middleware;
pub mod stats;
pub mod store;

pub use cache_config::{CacheConfig, CacheConfigBuilder};
pub use cache_key::{CacheKeyGenerator, PIPELINE_KEY_PREFIX};
pub use middleware::{
    operation, CachedOperation, FnOperation, InvalidatingOperation, InvalidationKeys,
    MethodCacheOptions, Operation, OperationExt, OperationId, OperationTimings, TimedOperation,
};
pub use stats::{CacheMetrics, CacheStatistics};
pub use store::{CacheStore, CacheStoreStats, SweeperHandle};

use crate::core::AggPipeError;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to generate a valid cache key from the input parameters
    #[error("Cache key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// JSON serialization or deserialization of cache entries failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid cache configuration parameters provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Background work needs a tokio runtime that is not available
    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}

impl From<CacheError> for AggPipeError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::KeyGenerationFailed(message) => AggPipeError::CacheKey {
                operation: "cache key generation".to_string(),
                message,
            },
            CacheError::Configuration(message) => AggPipeError::Config {
                message: format!("cache: {message}"),
            },
            CacheError::Serialization(e) => AggPipeError::Serialization {
                message: format!("cache entry: {e}"),
            },
            CacheError::Runtime(reason) => AggPipeError::Unsupported {
                operation: "cache sweeper".to_string(),
                reason,
            },
        }
    }
}

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// A stored value with its lifetime metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached value
    pub value: serde_json::Value,
    /// Wall-clock creation time
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Monotonic creation time used for expiry checks
    pub(crate) inserted: std::time::Instant,
    /// Lifetime of the entry
    pub ttl: std::time::Duration,
}

impl CacheEntry {
    /// Creates a new entry that expires `ttl` from now.
    pub fn new(value: serde_json::Value, ttl: std::time::Duration) -> Self {
        Self {
            value,
            created_at: chrono::Utc::now(),
            inserted: std::time::Instant::now(),
            ttl,
        }
    }

    /// Returns how long this entry has been in the cache.
    pub fn age(&self) -> std::time::Duration {
        self.inserted.elapsed()
    }

    /// Whether the entry is past its lifetime at `now`.
    ///
    /// An entry is live strictly before `created + ttl`.
    pub fn is_expired_at(&self, now: std::time::Instant) -> bool {
        now.saturating_duration_since(self.inserted) >= self.ttl
    }

    /// Whether the entry is past its lifetime now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(std::time::Instant::now())
    }

    /// Approximate memory footprint of the entry in bytes.
    pub fn approx_size(&self, key: &str) -> usize {
        key.len() + self.value.to_string().len() + std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = CacheEntry::new(serde_json::json!(1), Duration::from_millis(50));
        assert!(!entry.is_expired_at(entry.inserted + Duration::from_millis(49)));
        assert!(entry.is_expired_at(entry.inserted + Duration::from_millis(50)));
    }

    #[test]
    fn test_entry_age_grows() {
        let entry = CacheEntry::new(serde_json::json!(1), Duration::from_secs(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(entry.age() >= Duration::from_millis(5));
    }

    #[test]
    fn test_cache_error_conversion() {
        let err: AggPipeError = CacheError::KeyGenerationFailed("bad args".into()).into();
        assert!(matches!(err, AggPipeError::CacheKey { .. }));

        let err: AggPipeError = CacheError::Configuration("ttl".into()).into();
        assert!(matches!(err, AggPipeError::Config { .. }));

        let err: AggPipeError = CacheError::Runtime("no reactor".into()).into();
        assert_eq!(err.category(), "unsupported");
    }
}
