//! Configuration management for the flowkeep binary
//!
//! Priority order:
//! 1. Default values
//! 2. The TOML file given by `--config` (default `./flowkeep.toml`)
//! 3. Command-line overrides such as `--database`

mod loader;
mod schema;

pub use loader::{ConfigLoader, DEFAULT_CONFIG_FILE};
pub use schema::{DatabaseConfig, FlowkeepConfig, LoggingConfig, SourceConfig, WorkflowConfig};

use std::path::Path;

use crate::error::Result;

/// Load configuration from `path`
pub async fn load_config(path: impl AsRef<Path>) -> Result<FlowkeepConfig> {
    ConfigLoader::new(path.as_ref()).load().await
}
