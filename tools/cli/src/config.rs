//! CLI configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use gallerystore_storage::{ProviderRegistry, StorageConfig, StorageManager};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GALLERYSTORE_CONFIG";

/// Contents of the JSON config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Backend configuration, tagged by `provider`.
    pub storage: StorageConfig,
    /// Key prefixes hidden from listings.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl CliConfig {
    /// Load a config file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Build a manager with the configured provider and exclusions.
    pub fn build_manager(&self, registry: &ProviderRegistry) -> Result<StorageManager> {
        let mut manager = StorageManager::from_config(registry, &self.storage)
            .with_context(|| format!("Failed to create '{}' provider", self.storage.kind()))?;

        for prefix in &self.exclude {
            manager
                .add_excluded_prefix(prefix)
                .with_context(|| format!("Invalid exclude prefix '{}'", prefix))?;
        }

        Ok(manager)
    }
}

/// Resolve the config file path: flag, then environment, then the user
/// config directory.
pub fn resolve_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }

    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|dir| dir.join("gallerystore").join("config.json"))
        .context("No config file given and no user config directory found")
}
