//! Cache configuration

use std::time::Duration;

use super::{CacheError, CacheResult};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled at all
    pub enabled: bool,

    /// Default time-to-live for cache entries in seconds
    pub default_ttl_seconds: u64,

    /// Interval between background sweeps of expired entries (seconds)
    pub sweep_interval_seconds: u64,

    /// Maximum number of keys deleted per write-lock acquisition during a sweep
    pub sweep_batch_size: usize,
}

impl Default for CacheConfig {
    /// Returns a default cache configuration suitable for general use
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: 300,    // 5 minutes
            sweep_interval_seconds: 300, // 5 minutes
            sweep_batch_size: 256,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> CacheResult<()> {
        if self.default_ttl_seconds == 0 {
            return Err(CacheError::Configuration(
                "default_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if self.sweep_interval_seconds == 0 {
            return Err(CacheError::Configuration(
                "sweep_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.sweep_batch_size == 0 {
            return Err(CacheError::Configuration(
                "sweep_batch_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the default TTL as Duration
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Get the sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Create a production-ready configuration
    pub fn production() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: 600,    // 10 minutes
            sweep_interval_seconds: 300, // 5 minutes
            sweep_batch_size: 1024,
        }
    }

    /// Create a development configuration with short lifetimes
    pub fn development() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: 60,
            sweep_interval_seconds: 30,
            sweep_batch_size: 128,
        }
    }
}

/// Builder for cache configuration
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Create a new cache configuration builder with default settings
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
        }
    }

    /// Enable or disable caching
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the default time-to-live in seconds
    pub fn default_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.default_ttl_seconds = seconds;
        self
    }

    /// Set the default time-to-live as a Duration, rounded up to whole seconds
    pub fn default_ttl(mut self, duration: Duration) -> Self {
        let whole = duration.as_secs();
        self.config.default_ttl_seconds = if duration.subsec_nanos() > 0 {
            whole.saturating_add(1)
        } else {
            whole
        };
        self
    }

    /// Set the sweep interval in seconds
    pub fn sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.sweep_interval_seconds = seconds;
        self
    }

    /// Set the sweep deletion batch size
    pub fn sweep_batch_size(mut self, size: usize) -> Self {
        self.config.sweep_batch_size = size;
        self
    }

    /// Build the cache configuration without validation
    pub fn build(self) -> CacheConfig {
        self.config
    }

    /// Build and validate the cache configuration
    pub fn build_validated(self) -> CacheResult<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for CacheConfigBuilder {
    /// Returns a new cache configuration builder with default settings
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .default_ttl_seconds(30)
            .sweep_interval_seconds(10)
            .sweep_batch_size(8)
            .enabled(false)
            .build();

        assert_eq!(config.default_ttl_seconds, 30);
        assert_eq!(config.sweep_interval_seconds, 10);
        assert_eq!(config.sweep_batch_size, 8);
        assert!(!config.enabled);
    }

    #[test]
    fn test_sub_second_ttl_rounds_up() {
        let config = CacheConfig::builder()
            .default_ttl(Duration::from_millis(60))
            .build();
        assert_eq!(config.default_ttl_seconds, 1);
        assert!(config.validate().is_ok());

        let config = CacheConfig::builder()
            .default_ttl(Duration::from_millis(1500))
            .build();
        assert_eq!(config.default_ttl_seconds, 2);

        let config = CacheConfig::builder().default_ttl(Duration::from_secs(45)).build();
        assert_eq!(config.default_ttl_seconds, 45);
    }

    #[test]
    fn test_config_validation() {
        let config = CacheConfig {
            default_ttl_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let result = CacheConfig::builder().sweep_interval_seconds(0).build_validated();
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_preset_configs() {
        assert!(CacheConfig::production().validate().is_ok());
        assert!(CacheConfig::development().validate().is_ok());
        assert!(CacheConfig::development().default_ttl() < CacheConfig::production().default_ttl());
    }
}
