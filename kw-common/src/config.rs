//! Configuration loading for kamerwatch services
//!
//! Per-key resolution priority:
//! 1. Environment variable (`KW_*`, highest priority)
//! 2. TOML config file
//! 3. Compiled default
//!
//! A missing config file is normal (defaults apply); a malformed one is a
//! startup error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default scraper backend base URL
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8321";
/// Default kw-track listen port
pub const DEFAULT_LISTEN_PORT: u16 = 5746;
/// Default confidence at or above which the backend auto-links duplicates
pub const DEFAULT_AUTO_LINK_THRESHOLD: f64 = 0.7;
/// Default delay before the first status poll (milliseconds)
pub const DEFAULT_POLL_INITIAL_DELAY_MS: u64 = 2_000;
/// Default interval between status polls (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
/// Default hard ceiling on status polls per job
pub const DEFAULT_POLL_CEILING: u32 = 60;

/// On-disk TOML configuration (all keys optional)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Scraper backend base URL
    pub backend_url: Option<String>,
    /// HTTP listen port for kw-track
    pub listen_port: Option<u16>,
    /// Confidence at or above which duplicates are auto-linked
    pub auto_link_threshold: Option<f64>,
    /// Delay before the first status poll (milliseconds)
    pub poll_initial_delay_ms: Option<u64>,
    /// Interval between status polls (milliseconds)
    pub poll_interval_ms: Option<u64>,
    /// Hard ceiling on status polls per job
    pub poll_ceiling: Option<u32>,
    /// tracing-subscriber filter directive (e.g. "kw_track=debug,info")
    pub log_filter: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct TrackConfig {
    pub backend_url: String,
    pub listen_port: u16,
    pub auto_link_threshold: f64,
    pub poll_initial_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_ceiling: u32,
    pub log_filter: String,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            auto_link_threshold: DEFAULT_AUTO_LINK_THRESHOLD,
            poll_initial_delay_ms: DEFAULT_POLL_INITIAL_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_ceiling: DEFAULT_POLL_CEILING,
            log_filter: "info".to_string(),
        }
    }
}

impl TrackConfig {
    /// Resolve configuration from environment, config file, and defaults
    pub fn resolve() -> Result<Self> {
        let path = config_file_path();
        let toml_config = load_toml_config(&path)?;
        Ok(Self::from_sources(&toml_config))
    }

    /// Apply env → TOML → default priority per key
    pub fn from_sources(toml_config: &TomlConfig) -> Self {
        let defaults = Self::default();

        let backend_url = env_string("KW_BACKEND_URL")
            .or_else(|| toml_config.backend_url.clone())
            .unwrap_or(defaults.backend_url);

        let listen_port = env_parsed::<u16>("KW_LISTEN_PORT")
            .or(toml_config.listen_port)
            .unwrap_or(defaults.listen_port);

        let auto_link_threshold = env_parsed::<f64>("KW_AUTO_LINK_THRESHOLD")
            .or(toml_config.auto_link_threshold)
            .unwrap_or(defaults.auto_link_threshold);

        let poll_initial_delay_ms = env_parsed::<u64>("KW_POLL_INITIAL_DELAY_MS")
            .or(toml_config.poll_initial_delay_ms)
            .unwrap_or(defaults.poll_initial_delay_ms);

        let poll_interval_ms = env_parsed::<u64>("KW_POLL_INTERVAL_MS")
            .or(toml_config.poll_interval_ms)
            .unwrap_or(defaults.poll_interval_ms);

        let poll_ceiling = env_parsed::<u32>("KW_POLL_CEILING")
            .or(toml_config.poll_ceiling)
            .unwrap_or(defaults.poll_ceiling);

        let log_filter = env_string("KW_LOG_FILTER")
            .or_else(|| toml_config.log_filter.clone())
            .unwrap_or(defaults.log_filter);

        if !(0.0..=1.0).contains(&auto_link_threshold) {
            warn!(
                threshold = auto_link_threshold,
                "auto_link_threshold outside [0.0, 1.0], using default"
            );
            return Self {
                backend_url,
                listen_port,
                auto_link_threshold: DEFAULT_AUTO_LINK_THRESHOLD,
                poll_initial_delay_ms,
                poll_interval_ms,
                poll_ceiling,
                log_filter,
            };
        }

        Self {
            backend_url,
            listen_port,
            auto_link_threshold,
            poll_initial_delay_ms,
            poll_interval_ms,
            poll_ceiling,
            log_filter,
        }
    }
}

/// Configuration file location: `KW_CONFIG` env override, else
/// `<config dir>/kamerwatch/kw-track.toml`
pub fn config_file_path() -> PathBuf {
    if let Ok(path) = std::env::var("KW_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .map(|d| d.join("kamerwatch").join("kw-track.toml"))
        .unwrap_or_else(|| PathBuf::from("kw-track.toml"))
}

/// Load a TOML config file; a missing file yields defaults
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!(path = %path.display(), "Configuration loaded from TOML");
    Ok(config)
}

/// Write a TOML config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_no_sources() {
        let config = TrackConfig::from_sources(&TomlConfig::default());
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
        assert_eq!(config.auto_link_threshold, DEFAULT_AUTO_LINK_THRESHOLD);
        assert_eq!(config.poll_ceiling, DEFAULT_POLL_CEILING);
    }

    #[test]
    fn test_toml_values_override_defaults() {
        let toml_config = TomlConfig {
            backend_url: Some("http://backend:9000".to_string()),
            listen_port: Some(7000),
            auto_link_threshold: Some(0.8),
            ..Default::default()
        };
        let config = TrackConfig::from_sources(&toml_config);
        assert_eq!(config.backend_url, "http://backend:9000");
        assert_eq!(config.listen_port, 7000);
        assert_eq!(config.auto_link_threshold, 0.8);
        // Untouched keys keep defaults
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_out_of_range_threshold_falls_back() {
        let toml_config = TomlConfig {
            auto_link_threshold: Some(1.5),
            ..Default::default()
        };
        let config = TrackConfig::from_sources(&toml_config);
        assert_eq!(config.auto_link_threshold, DEFAULT_AUTO_LINK_THRESHOLD);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_toml_config(&path).unwrap();
        assert!(config.backend_url.is_none());
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "backend_url = [not toml").unwrap();
        assert!(load_toml_config(&path).is_err());
    }

    #[test]
    fn test_write_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("kw-track.toml");
        let config = TomlConfig {
            backend_url: Some("http://backend:9000".to_string()),
            poll_ceiling: Some(10),
            ..Default::default()
        };

        write_toml_config(&config, &path).unwrap();
        let loaded = load_toml_config(&path).unwrap();

        assert_eq!(loaded.backend_url.as_deref(), Some("http://backend:9000"));
        assert_eq!(loaded.poll_ceiling, Some(10));
    }
}
