//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use aggpipe_core::caching::{CacheConfig, CacheStore};
use aggpipe_core::{AggPipeConfig, Document, MockEngine};
use serde_json::json;

/// Three task documents as the engine would return them
pub fn task_documents() -> Vec<Document> {
    vec![
        json!({ "_id": { "$oid": "507f1f77bcf86cd799439011" }, "title": "Write docs", "status": "open" }),
        json!({ "_id": { "$oid": "507f1f77bcf86cd799439012" }, "title": "Fix sweep", "status": "open" }),
        json!({ "_id": { "$oid": "507f1f77bcf86cd799439013" }, "title": "Ship", "status": "done" }),
    ]
}

/// Engine returning the task fixtures with indexed statistics
pub fn task_engine() -> MockEngine {
    MockEngine::with_documents(task_documents()).stats(3, &["status_1"])
}

/// Shared store with default settings
pub fn shared_store() -> Arc<CacheStore> {
    Arc::new(CacheStore::new(CacheConfig::default()))
}

/// Configuration with a fast sweep for lifecycle tests
pub fn fast_sweep_config() -> AggPipeConfig {
    let mut config = AggPipeConfig::default();
    config.cache.sweep_interval_seconds = 1;
    config
}
