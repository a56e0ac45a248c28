//! Client configuration.
//!
//! Configuration is stored at `~/.config/coursedeck/config.json` and can be
//! overridden with the `COURSEDECK_API_URL` environment variable, which is
//! how staging builds and local backends are pointed at.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Production API origin
pub const DEFAULT_API_BASE_URL: &str = "https://api.coursedeck.io";

/// Application name used for config directory paths
const APP_NAME: &str = "coursedeck";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API origin
const API_URL_ENV: &str = "COURSEDECK_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Override for the session file location; defaults to the config dir.
    pub session_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            session_file: None,
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.is_empty() {
                config.api_base_url = url;
            }
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Build a config pointing at a specific origin. Used by tests and
    /// embedders that resolve the origin themselves.
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            session_file: None,
        }
    }
}
