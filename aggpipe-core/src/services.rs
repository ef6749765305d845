//! Process-lifetime wiring of the shared store, monitor and sweeper.

use std::sync::Arc;

use crate::caching::{CacheStore, SweeperHandle};
use crate::config::AggPipeConfig;
use crate::core::Result;
use crate::monitoring::PerformanceMonitor;
use crate::pipeline::PipelineBuilder;

/// Shared services created once at startup and passed to callers explicitly.
#[derive(Debug)]
pub struct QueryServices {
    config: AggPipeConfig,
    store: Arc<CacheStore>,
    monitor: Arc<PerformanceMonitor>,
    sweeper: Option<SweeperHandle>,
}

impl QueryServices {
    /// Validate `config`, create the store and monitor, and start the sweeper.
    ///
    /// With caching enabled this fails outside a tokio runtime.
    pub fn start(config: AggPipeConfig) -> Result<Self> {
        Self::start_with_monitor(config, |monitor| monitor)
    }

    /// Like [`start`](Self::start), letting the caller customise the monitor,
    /// e.g. to attach an alert handler.
    pub fn start_with_monitor(
        config: AggPipeConfig,
        customise: impl FnOnce(PerformanceMonitor) -> PerformanceMonitor,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(CacheStore::new(config.cache.clone()));
        let monitor = Arc::new(customise(PerformanceMonitor::new(config.monitor.clone())));
        let sweeper = if config.cache.enabled {
            Some(store.spawn_sweeper(config.cache.sweep_interval())?)
        } else {
            None
        };

        tracing::info!(
            cache_enabled = config.cache.enabled,
            default_ttl_seconds = config.cache.default_ttl_seconds,
            history_capacity = config.monitor.history_capacity,
            "query services started"
        );

        Ok(Self {
            config,
            store,
            monitor,
            sweeper,
        })
    }

    /// Configuration in effect
    pub fn config(&self) -> &AggPipeConfig {
        &self.config
    }

    /// Shared result cache
    pub fn store(&self) -> Arc<CacheStore> {
        Arc::clone(&self.store)
    }

    /// Shared performance monitor
    pub fn monitor(&self) -> Arc<PerformanceMonitor> {
        Arc::clone(&self.monitor)
    }

    /// A pipeline builder on `collection` with the monitor attached
    pub fn builder(&self, collection: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(collection).with_monitor(self.monitor())
    }

    /// Stop the sweeper and drop cached entries.
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.shutdown().await;
        }
        let cache = self.store.metrics();
        self.store.clear();
        tracing::info!(
            recorded_queries = self.monitor.history_len(),
            cache_hits = cache.cache_hits,
            cache_misses = cache.cache_misses,
            hit_rate = format!("{:.2}%", cache.hit_rate * 100.0),
            expirations = cache.expirations,
            "query services stopped"
        );
    }
}
