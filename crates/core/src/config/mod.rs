//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CACHEFIRST_*)
//! 2. TOML config file (if CACHEFIRST_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CACHEFIRST_*)
/// 2. TOML config file (if CACHEFIRST_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Versioned store name. Changing it invalidates every previously
    /// cached entry on the next activation.
    ///
    /// Set via CACHEFIRST_CACHE_NAME environment variable.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Path to SQLite store database.
    ///
    /// Set via CACHEFIRST_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin that relative request and precache URLs resolve against.
    ///
    /// Set via CACHEFIRST_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// URLs fetched and stored at install time, in order.
    #[serde(default)]
    pub precache_urls: Vec<String>,

    /// Optional JSON file holding an array of further precache URLs.
    ///
    /// Set via CACHEFIRST_PRECACHE_MANIFEST environment variable.
    #[serde(default)]
    pub precache_manifest: Option<PathBuf>,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to read per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Network request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects followed per request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_cache_name() -> String {
    "default-sw-cache-v1".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./cachefirst.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080/".into()
}

fn default_user_agent() -> String {
    "cachefirst/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            db_path: default_db_path(),
            origin: default_origin(),
            precache_urls: Vec::new(),
            precache_manifest: None,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed origin URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin).map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CACHEFIRST_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CACHEFIRST_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The full precache list: inline URLs first, then manifest entries.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::LoadFailed` if the manifest cannot be read or is
    /// not a JSON array of strings.
    pub fn precache_list(&self) -> Result<Vec<String>, ConfigError> {
        let mut urls = self.precache_urls.clone();

        if let Some(path) = &self.precache_manifest {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::LoadFailed(format!("precache manifest {}: {e}", path.display())))?;
            let listed: Vec<String> = serde_json::from_str(&raw)
                .map_err(|e| ConfigError::LoadFailed(format!("precache manifest {}: {e}", path.display())))?;
            urls.extend(listed);
        }

        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache_name, "default-sw-cache-v1");
        assert_eq!(config.db_path, PathBuf::from("./cachefirst.sqlite"));
        assert_eq!(config.origin, "http://localhost:8080/");
        assert_eq!(config.user_agent, "cachefirst/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_redirects, 5);
        assert!(config.precache_urls.is_empty());
        assert!(config.precache_manifest.is_none());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_origin_url() {
        let config = AppConfig::default();
        assert_eq!(config.origin_url().unwrap().as_str(), "http://localhost:8080/");

        let config = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert!(matches!(config.origin_url(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_precache_list_inline_only() {
        let config = AppConfig { precache_urls: vec!["/a.js".into()], ..Default::default() };
        assert_eq!(config.precache_list().unwrap(), vec!["/a.js"]);
    }

    #[test]
    fn test_precache_list_with_manifest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["/b.css", "/c.png"]"#).unwrap();

        let config = AppConfig {
            precache_urls: vec!["/a.js".into()],
            precache_manifest: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(config.precache_list().unwrap(), vec!["/a.js", "/b.css", "/c.png"]);
    }

    #[test]
    fn test_precache_manifest_not_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"urls": []}}"#).unwrap();

        let config = AppConfig { precache_manifest: Some(file.path().to_path_buf()), ..Default::default() };
        assert!(matches!(config.precache_list(), Err(ConfigError::LoadFailed(_))));
    }
}
