use crate::caching::CacheConfig;
use crate::config_error;
use crate::Result;

/// Configuration file loading utilities
pub mod loader;

pub use loader::{load_config, save_config, ConfigFormat};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AggPipeConfig {
    /// Result cache settings
    pub cache: CacheConfig,

    /// Performance monitor thresholds and capacities
    pub monitor: MonitorConfig,
}

impl AggPipeConfig {
    /// Load from a TOML or JSON file, chosen by extension
    pub fn from_file(path: &str) -> Result<Self> {
        load_config(path)
    }

    /// Write to a TOML or JSON file, chosen by extension
    pub fn to_file(&self, path: &str) -> Result<()> {
        save_config(self, path)
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.monitor.validate()
    }

    /// Short lifetimes and sensitive thresholds for local work
    pub fn development() -> Self {
        Self {
            cache: CacheConfig::development(),
            monitor: MonitorConfig {
                slow_query_ms: 250,
                critical_query_ms: 1000,
                ..MonitorConfig::default()
            },
        }
    }

    /// Longer lifetimes and larger sweep batches
    pub fn production() -> Self {
        Self {
            cache: CacheConfig::production(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Performance monitor configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Executions kept in the rolling history
    pub history_capacity: usize,

    /// Alerts kept in the alert log
    pub alert_capacity: usize,

    /// Executions slower than this raise a slow-query alert (ms)
    pub slow_query_ms: u64,

    /// Slow queries above this are high severity (ms)
    pub critical_query_ms: u64,

    /// Memory above this raises a high-memory alert (bytes)
    pub high_memory_bytes: u64,

    /// Unindexed scans of more documents than this raise an alert
    pub no_index_min_examined: u64,

    /// Results larger than this raise an alert
    pub large_result_threshold: u64,

    /// Entries in `slowest_queries` of the statistics
    pub slowest_queries_reported: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            alert_capacity: 1000,
            slow_query_ms: 1000,
            critical_query_ms: 5000,
            high_memory_bytes: 100 * 1024 * 1024,
            no_index_min_examined: 100,
            large_result_threshold: 10_000,
            slowest_queries_reported: 10,
        }
    }
}

impl MonitorConfig {
    /// Check capacities and threshold ordering
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(config_error!("monitor.history_capacity must be greater than 0"));
        }
        if self.alert_capacity == 0 {
            return Err(config_error!("monitor.alert_capacity must be greater than 0"));
        }
        if self.critical_query_ms < self.slow_query_ms {
            return Err(config_error!(
                "monitor.critical_query_ms ({}) must not be below slow_query_ms ({})",
                self.critical_query_ms,
                self.slow_query_ms
            ));
        }
        Ok(())
    }
}
