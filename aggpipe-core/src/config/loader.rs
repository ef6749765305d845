use std::fs;
use std::path::Path;

use crate::config::AggPipeConfig;
use crate::core::{AggPipeError, Result};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML configuration format
    Toml,
    /// JSON configuration format
    Json,
}

impl ConfigFormat {
    /// Determine configuration format from file extension
    pub fn from_extension(path: &str) -> Self {
        match Path::new(path).extension().and_then(|s| s.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml, // Default
        }
    }
}

/// Load and validate configuration from file
pub fn load_config(path: &str) -> Result<AggPipeConfig> {
    if !Path::new(path).exists() {
        return Err(AggPipeError::Config {
            message: format!("Configuration file not found: {path}"),
        });
    }

    let content = fs::read_to_string(path)?;
    let config = match ConfigFormat::from_extension(path) {
        ConfigFormat::Toml => parse_toml(&content)?,
        ConfigFormat::Json => parse_json(&content)?,
    };

    config.validate()?;
    tracing::info!(path = %path, "configuration loaded");
    Ok(config)
}

/// Write configuration to file
pub fn save_config(config: &AggPipeConfig, path: &str) -> Result<()> {
    let content = match ConfigFormat::from_extension(path) {
        ConfigFormat::Toml => render_toml(config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
    };
    fs::write(path, content)?;
    Ok(())
}

fn parse_json(content: &str) -> Result<AggPipeConfig> {
    serde_json::from_str(content).map_err(|e| AggPipeError::Config {
        message: format!("Failed to parse JSON config: {e}"),
    })
}

#[cfg(feature = "toml-support")]
fn parse_toml(content: &str) -> Result<AggPipeConfig> {
    toml::from_str(content).map_err(|e| AggPipeError::Config {
        message: format!("Failed to parse TOML config: {e}"),
    })
}

#[cfg(not(feature = "toml-support"))]
fn parse_toml(_content: &str) -> Result<AggPipeConfig> {
    Err(AggPipeError::Config {
        message: "TOML support not enabled. Enable 'toml-support' feature.".to_string(),
    })
}

#[cfg(feature = "toml-support")]
fn render_toml(config: &AggPipeConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| AggPipeError::Serialization {
        message: format!("Failed to render TOML config: {e}"),
    })
}

#[cfg(not(feature = "toml-support"))]
fn render_toml(_config: &AggPipeConfig) -> Result<String> {
    Err(AggPipeError::Config {
        message: "TOML support not enabled. Enable 'toml-support' feature.".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("a.json"), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_extension("a.toml"), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_extension("a"), ConfigFormat::Toml);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/definitely/not/here.toml");
        assert!(matches!(result, Err(AggPipeError::Config { .. })));
    }

    #[test]
    fn test_load_partial_json() {
        let file = write_temp(".json", r#"{ "cache": { "default_ttl_seconds": 60 } }"#);
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.cache.default_ttl_seconds, 60);
        assert_eq!(config.cache.sweep_batch_size, 256);
        assert_eq!(config.monitor.slow_query_ms, 1000);
    }

    #[cfg(feature = "toml-support")]
    #[test]
    fn test_load_toml() {
        let file = write_temp(
            ".toml",
            "[cache]\nenabled = false\n\n[monitor]\nslow_query_ms = 200\ncritical_query_ms = 800\n",
        );
        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.monitor.slow_query_ms, 200);
        assert_eq!(config.monitor.history_capacity, 1000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_temp(".json", r#"{ "monitor": { "history_capacity": 0 } }"#);
        let result = load_config(file.path().to_str().unwrap());
        assert!(matches!(result, Err(AggPipeError::Config { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let file = write_temp(".json", "{ not json");
        let result = load_config(file.path().to_str().unwrap());
        assert!(matches!(result, Err(AggPipeError::Config { .. })));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aggpipe.json");
        let path = path.to_str().unwrap();

        let config = AggPipeConfig::development();
        save_config(&config, path).unwrap();
        assert_eq!(load_config(path).unwrap(), config);
    }
}
