//! Configuration Loader
//!
//! Layers configuration from defaults, an optional JSON file and the
//! environment. Later sources override earlier ones.

use crate::config::settings::{ApiKey, ClientConfig};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_ORGANIZATION: &str = "OPENAI_ORG_ID";
pub const ENV_PROJECT: &str = "OPENAI_PROJECT_ID";
pub const ENV_CONFIG_PATH: &str = "OPENAI_RESPONSES_CONFIG";

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    config: ClientConfig,
}

impl ConfigLoader {
    /// Load from the default file locations, then the environment
    pub fn new() -> Result<Self> {
        // A missing .env file is normal
        let _ = dotenvy::dotenv();

        let mut loader = Self {
            config: ClientConfig::default(),
        };

        loader.load_from_default_paths()?;
        loader.apply_env(|name| std::env::var(name).ok());

        Ok(loader)
    }

    /// Load from a specific file, then the environment
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut loader = Self {
            config: ClientConfig::default(),
        };

        loader.load_from_file(path)?;
        loader.apply_env(|name| std::env::var(name).ok());

        Ok(loader)
    }

    /// Load configuration from default paths; the first file found wins
    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return self.load_from_file(&path);
            }
        }

        Ok(())
    }

    /// Get list of config paths to check
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. Environment variable
        if let Ok(custom_path) = std::env::var(ENV_CONFIG_PATH) {
            paths.push(PathBuf::from(custom_path));
        }

        // 2. Current directory
        paths.push(PathBuf::from("openai-responses.json"));

        // 3. User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("openai-responses").join("config.json"));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: ClientConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Loaded client configuration file");
        self.merge_config(config);
        Ok(())
    }

    /// Override settings from environment variables
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_API_KEY) {
            self.config.api_key = Some(ApiKey::new(key));
        }
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.config.base_url = url;
        }
        if let Some(org) = non_empty(ENV_ORGANIZATION) {
            self.config.organization = Some(org);
        }
        if let Some(project) = non_empty(ENV_PROJECT) {
            self.config.project = Some(project);
        }
    }

    /// Merge another config into this one
    fn merge_config(&mut self, other: ClientConfig) {
        if other.api_key.is_some() {
            self.config.api_key = other.api_key;
        }
        self.config.base_url = other.base_url;
        if other.organization.is_some() {
            self.config.organization = other.organization;
        }
        if other.project.is_some() {
            self.config.project = other.project;
        }
        self.config.timeout_secs = other.timeout_secs;
        self.config.connect_timeout_secs = other.connect_timeout_secs;
        self.config.headers.extend(other.headers);
        self.config.pricing.merge(other.pricing);
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Take ownership of the configuration
    pub fn into_config(self) -> ClientConfig {
        self.config
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            config: ClientConfig::default(),
        })
    }
}
