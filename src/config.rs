// Folio Storage Client Configuration
// Persistent client settings with environment overrides

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::providers::ProviderError;
use crate::transfer_pool::{validate_config as validate_transfer, ParallelTransferConfig};

pub const ENV_URL: &str = "FOLIO_STORAGE_URL";
pub const ENV_TOKEN: &str = "FOLIO_STORAGE_TOKEN";

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API root, e.g. https://files.example.com/api
    pub base_url: String,
    /// Bearer token sent with every request, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default)]
    pub transfer: ParallelTransferConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            transfer: ParallelTransferConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Apply overrides from a variable lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.api_token = Some(token.trim().to_string());
        }
    }

    pub fn validate(&mut self) -> Result<(), ProviderError> {
        validate_transfer(&mut self.transfer);
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ProviderError::InvalidConfig(format!("base_url '{}': {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProviderError::InvalidConfig(format!(
                "base_url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        Ok(())
    }
}

/// Get the path to the client config file
pub fn config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("folio-storage").join("config.json")
}

/// Load configuration from `path`, falling back to defaults
pub fn load_config_from(path: &Path) -> ClientConfig {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Failed to parse client config {:?}: {}", path, e),
            },
            Err(e) => tracing::warn!("Failed to read client config {:?}: {}", path, e),
        }
    }
    ClientConfig::default()
}

/// Load configuration from disk and the process environment
pub fn load_config() -> ClientConfig {
    let mut config = load_config_from(&config_path());
    config.apply_env(|key| std::env::var(key).ok());
    config
}

pub fn save_config_to(config: &ClientConfig, path: &Path) -> Result<(), ProviderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ProviderError::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
    fs::write(path, content)?;
    tracing::info!("Client config saved to {:?}", path);
    Ok(())
}

pub fn save_config(config: &ClientConfig) -> Result<(), ProviderError> {
    save_config_to(config, &config_path())
}
