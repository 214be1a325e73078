//! Configuration loader
//!
//! Reads one TOML file. A missing file is not an error: every section falls
//! back to its defaults.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::config::schema::FlowkeepConfig;
use crate::error::{CliError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "flowkeep.toml";

pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load, expand environment variables and validate
    pub async fn load(&self) -> Result<FlowkeepConfig> {
        let mut config = if fs::try_exists(&self.path).await.unwrap_or(false) {
            let config = self.load_from_path(&self.path).await?;
            debug!(path = %self.path.display(), "Loaded config file");
            config
        } else {
            debug!(path = %self.path.display(), "Config file not found, using defaults");
            FlowkeepConfig::default()
        };

        config.resolve_env_vars();
        config.validate()?;

        info!(database = %config.database.path, sources = config.sources.len(), "Configuration loaded");
        Ok(config)
    }

    async fn load_from_path(&self, path: &Path) -> Result<FlowkeepConfig> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| CliError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;

        toml::from_str(&content).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}
