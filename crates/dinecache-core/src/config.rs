//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the review API location, cache freshness and the sync
//! interval for replaying queued writes.
//!
//! Configuration is stored at `~/.config/dinecache/config.json`. The
//! `DINECACHE_API_URL` and `DINECACHE_CACHE_DIR` environment variables
//! override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "dinecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Where the review API listens unless configured otherwise.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:1337";

/// Cached API data is refetched once it is older than this.
const DEFAULT_CACHE_TTL_MINUTES: i64 = 60;

/// How often the background worker replays queued writes.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

const ENV_API_URL: &str = "DINECACHE_API_URL";
const ENV_CACHE_DIR: &str = "DINECACHE_CACHE_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    /// `None` keeps cached API data forever.
    pub cache_ttl_minutes: Option<i64>,
    pub sync_interval_secs: u64,
    /// When set, API reads are answered from the cache only and queued
    /// writes stay queued.
    pub offline_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            cache_dir: None,
            cache_ttl_minutes: Some(DEFAULT_CACHE_TTL_MINUTES),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            offline_mode: false,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Port that identifies API traffic. Requests to any other port are
    /// treated as static assets.
    pub fn api_port(&self) -> Result<u16> {
        let url = Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.api_base_url))?;
        url.port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("API base URL has no port: {}", self.api_base_url))
    }

    /// A TTL too large to represent keeps cached data forever.
    pub fn cache_ttl(&self) -> Option<chrono::Duration> {
        let minutes = self.cache_ttl_minutes?;
        let ttl = chrono::Duration::try_minutes(minutes);
        if ttl.is_none() {
            warn!(minutes, "Cache TTL out of range, cached data will not expire");
        }
        ttl
    }

    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_local_api() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:1337");
        assert_eq!(config.api_port().unwrap(), 1337);
        assert_eq!(config.cache_ttl(), Some(chrono::Duration::minutes(60)));
        assert!(!config.offline_mode);
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let config = Config {
            cache_ttl_minutes: Some(i64::MAX / 2),
            ..Config::default()
        };
        assert_eq!(config.cache_ttl(), None);

        let config = Config {
            cache_ttl_minutes: None,
            ..Config::default()
        };
        assert_eq!(config.cache_ttl(), None);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            api_base_url: "http://reviews.test:8080".to_string(),
            cache_ttl_minutes: None,
            offline_mode: true,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"offline_mode": true}"#).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert!(config.offline_mode);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.sync_interval_secs, 30);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "DINECACHE_API_URL" => Some("http://api.example.com:9000/".to_string()),
            "DINECACHE_CACHE_DIR" => Some("/tmp/dine".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://api.example.com:9000");
        assert_eq!(config.api_port().unwrap(), 9000);
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/dine"));
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_api_port_falls_back_to_scheme_default() {
        let config = Config {
            api_base_url: "https://reviews.example.com".to_string(),
            ..Config::default()
        };
        assert_eq!(config.api_port().unwrap(), 443);
    }
}
