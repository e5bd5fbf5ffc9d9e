//! Configuration management for harvest

pub mod schema;

pub use schema::{CacheKind, CacheSettings, Config};

use crate::error::{HarvestError, HarvestResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Config manager for the platform config directory
    pub fn at_default_path() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("harvest")
            .join("config.toml")
    }

    /// Directory holding cache tables, honouring `store.path`
    pub fn store_dir(config: &Config) -> PathBuf {
        config.store.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("harvest")
                .join("tables")
        })
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> HarvestResult<Config> {
        let path = &self.config_path;
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| HarvestError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| HarvestError::ConfigInvalid {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file, creating its directory
    pub async fn save(&self, config: &Config) -> HarvestResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HarvestError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            HarvestError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}
