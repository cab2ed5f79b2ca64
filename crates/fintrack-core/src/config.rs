//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! backend base URL, endpoint paths, the storage keys under which the two
//! credentials are persisted, and the last email used to log in.
//!
//! Configuration is stored at `~/.config/fintrack/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "fintrack";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const BASE_URL_ENV: &str = "FINTRACK_API_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Paths of the backend endpoints the client talks to, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub profile: String,
    pub refresh: String,
    pub transactions: String,
    pub categories: String,
    pub budgets: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/accounts/login/".to_string(),
            register: "/accounts/register/".to_string(),
            profile: "/accounts/profile/".to_string(),
            refresh: "/api/token/refresh/".to_string(),
            transactions: "/transactions/".to_string(),
            categories: "/categories/".to_string(),
            budgets: "/budgets/".to_string(),
        }
    }
}

/// Keys the access and refresh credentials are persisted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub access: String,
    pub refresh: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            access: "access_token".to_string(),
            refresh: "refresh_token".to_string(),
        }
    }
}

/// Where tokens are persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub endpoints: Endpoints,
    pub storage_keys: StorageKeys,
    /// View the session guard redirects to when access is denied
    pub login_path: String,
    pub token_backend: TokenBackend,
    pub last_email: Option<String>,
    /// Base URL from the environment; never written back to disk
    #[serde(skip)]
    base_url_override: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            endpoints: Endpoints::default(),
            storage_keys: StorageKeys::default(),
            login_path: "/login".to_string(),
            token_backend: TokenBackend::default(),
            last_email: None,
            base_url_override: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
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

    fn apply_env(&mut self) {
        self.base_url_override = std::env::var(BASE_URL_ENV)
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
    }

    /// Base URL requests go to: the environment override, else the config file
    pub fn base_url(&self) -> &str {
        self.base_url_override.as_deref().unwrap_or(&self.api_base_url)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
