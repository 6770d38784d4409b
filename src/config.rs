use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

const APP_NAME: &str = "pal-pan";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file. Defaults to `<data dir>/pal-pan.db`.
    pub database_path: Option<PathBuf>,
    /// Root of the managed file libraries. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Directory the HTTP API may import files from. Unset disables imports
    /// over HTTP; the CLI is not restricted.
    pub import_root: Option<PathBuf>,
    /// Port of the HTTP API.
    pub port: u16,
    /// Attempts for each storage or notification call, including the first.
    pub retry_attempts: u32,
    /// Pause between attempts, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            data_dir: None,
            import_root: None,
            port: 3000,
            retry_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl AppConfig {
    /// Load the config file, then apply `PALPAN_*` environment overrides.
    /// Falls back to defaults if the file doesn't exist or fails to parse.
    pub fn load() -> Self {
        let config = match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    fn try_load() -> Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config = serde_json::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Apply overrides read through `var`; unparsable values are ignored.
    pub fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = var("PALPAN_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = var("PALPAN_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = var("PALPAN_IMPORT_ROOT") {
            self.import_root = Some(PathBuf::from(dir));
        }
        if let Some(port) = var("PALPAN_PORT").and_then(|s| s.parse().ok()) {
            self.port = port;
        }
        if let Some(attempts) = var("PALPAN_RETRY_ATTEMPTS").and_then(|s| s.parse().ok()) {
            self.retry_attempts = attempts;
        }
        if let Some(ms) = var("PALPAN_RETRY_BACKOFF_MS").and_then(|s| s.parse().ok()) {
            self.retry_backoff_ms = ms;
        }
        self
    }

    /// Save the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => crate::db::default_path(),
        }
    }

    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let dirs = directories::ProjectDirs::from("", "", APP_NAME)
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("files"))
    }
}

fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
