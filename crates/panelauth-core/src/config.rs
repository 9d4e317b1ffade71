//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! backend base URL, the "remember me" defaults, which durable store to use,
//! the shared password-encryption secret and the last used username.
//!
//! Configuration is stored at `~/.config/panelauth/config.json`. The
//! `PANELAUTH_BASE_URL` and `PANELAUTH_ENCRYPT_KEY` environment variables
//! override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::DEFAULT_LOGIN_DAY;

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "panelauth";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

const ENV_BASE_URL: &str = "PANELAUTH_BASE_URL";
const ENV_ENCRYPT_KEY: &str = "PANELAUTH_ENCRYPT_KEY";

/// Where remembered sessions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DurableBackend {
    /// JSON files under the data directory.
    #[default]
    File,
    /// The OS keychain.
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub login_day: u32,
    pub remember: bool,
    pub durable_backend: DurableBackend,
    pub encrypt_key: Option<String>,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_day: DEFAULT_LOGIN_DAY,
            remember: false,
            durable_backend: DurableBackend::default(),
            encrypt_key: None,
            last_username: None,
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
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

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            if !url.is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(key) = std::env::var(ENV_ENCRYPT_KEY) {
            if !key.is_empty() {
                self.encrypt_key = Some(key);
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory of the durable file store.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join("session"))
    }

    /// Directory of the short-lived file store. Falls back to the temp
    /// directory on platforms without a runtime directory.
    pub fn runtime_dir(&self) -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_NAME)
    }
}
