//! Configuration settings for Signalroom.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides, e.g. `SIGNALROOM__API__BASE_URL`.
const ENV_PREFIX: &str = "SIGNALROOM";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend API configuration.
    pub api: ApiConfig,
    /// Signal lifecycle evaluation.
    pub lifecycle: LifecycleConfig,
    /// Local key-value storage.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default location, falling back to defaults.
    pub fn load_or_default() -> crate::Result<Self> {
        Self::load(None)
    }

    /// Load configuration from a TOML file layered with environment overrides.
    ///
    /// A missing file is not an error; every section falls back to its defaults.
    pub fn load(path: Option<PathBuf>) -> crate::Result<Self> {
        let config_path = path.unwrap_or_else(default_config_path);

        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(config_path.as_path())
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Save configuration to file.
    pub fn save(&self, path: Option<PathBuf>) -> crate::Result<()> {
        let config_path = path.unwrap_or_else(default_config_path);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::config(e.to_string()))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

fn default_config_path() -> PathBuf {
    super::config_dir()
        .map(|p| p.join("config.toml"))
        .unwrap_or_else(|_| PathBuf::from("config.toml"))
}

/// Backend API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST backend base URL.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries for failed requests.
    pub max_retries: u32,
    /// Rate limit (requests per second).
    pub rate_limit: u32,
    /// Bearer token used when no session token is supplied.
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            rate_limit: 10,
            auth_token: None,
        }
    }
}

/// Signal lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds between evaluation ticks.
    pub tick_secs: u64,
    /// Score awarded to the publisher per touched target.
    pub score_per_target: Decimal,
    /// Raise a notification when persisting a transition fails.
    pub notify_on_failure: bool,
    /// Reload signals from the backend every this many ticks. With 0 they
    /// are loaded once, on the first tick.
    pub refresh_every: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            score_per_target: Decimal::ONE,
            notify_on_failure: true,
            refresh_every: 1,
        }
    }
}

/// Local storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the key-value file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the key-value file location.
    pub fn resolve_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => super::data_dir()
                .map(|dir| dir.join("storage.json"))
                .unwrap_or_else(|_| Path::new("storage.json").to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.lifecycle.tick_secs, 60);
        assert_eq!(config.lifecycle.score_per_target, dec!(1));
        assert_eq!(config.lifecycle.refresh_every, 1);
        assert_eq!(config.api.rate_limit, 10);
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_overrides_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"https://api.example.com\"\n\n[lifecycle]\ntick_secs = 15\n",
        )
        .unwrap();

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.lifecycle.tick_secs, 15);
        assert!(config.lifecycle.notify_on_failure);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.lifecycle.score_per_target = dec!(2);
        config.save(Some(path.clone())).unwrap();

        let loaded = Config::load(Some(path)).unwrap();
        assert_eq!(loaded.lifecycle.score_per_target, dec!(2));
    }
}
