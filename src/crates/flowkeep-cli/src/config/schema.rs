//! Configuration schema for the flowkeep binary

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CliError, Result};

/// Main flowkeep configuration
///
/// ```toml
/// [database]
/// path = "${FLOWKEEP_HOME}/threads.db"
///
/// [workflow]
/// freshness_hours = 48
/// max_iterations = 4
///
/// [logging]
/// level = "info"
/// format = "compact"
///
/// [[sources]]
/// url = "https://example.edu/admissions"
/// summary = "Applications open 1 March."
/// fetched_at = "2024-05-01 09:30:00"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FlowkeepConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Known sources seeding the drafting workflow's catalog
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Checkpoint database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// SQLite file path, absolute or relative to the working directory
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "flowkeep.db".to_string(),
        }
    }
}

/// Tunables of the drafting workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    /// Cached sources older than this are fetched again
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: i64,

    /// Automatic regenerate attempts before escalating to review
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_freshness_hours() -> i64 {
    48
}

fn default_max_iterations() -> u32 {
    4
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            freshness_hours: default_freshness_hours(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_level")]
    pub level: String,

    /// Log format: "compact", "pretty" or "full"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "compact".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

/// One cached source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub url: String,

    /// Summary drafted from when the source is fresh
    #[serde(default)]
    pub summary: Option<String>,

    /// When the summary was taken; missing or "NULL" counts as never
    #[serde(default)]
    pub fetched_at: Option<String>,

    /// Page text returned when the source has to be fetched again
    #[serde(default)]
    pub content: Option<String>,
}

impl FlowkeepConfig {
    /// Resolve environment variables in configuration values
    ///
    /// Supports ${VAR_NAME} syntax in `database.path`
    pub fn resolve_env_vars(&mut self) {
        self.database.path = Self::expand_env_vars(&self.database.path);
    }

    /// Expand every `${VAR}` occurrence; unknown variables are left as written
    fn expand_env_vars(value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match std::env::var(name) {
                        Ok(resolved) => out.push_str(&resolved),
                        Err(_) => out.push_str(&rest[start..start + 2 + end + 1]),
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    /// Reject values the workflow cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(CliError::Config("database.path must not be empty".to_string()));
        }
        if self.workflow.freshness_hours <= 0 {
            return Err(CliError::Config(format!(
                "workflow.freshness_hours must be positive, got {}",
                self.workflow.freshness_hours
            )));
        }
        if self.workflow.max_iterations == 0 {
            return Err(CliError::Config(
                "workflow.max_iterations must be at least 1".to_string(),
            ));
        }
        if let Some(source) = self.sources.iter().find(|s| s.url.trim().is_empty()) {
            return Err(CliError::Config(format!(
                "source with summary {:?} has an empty url",
                source.summary
            )));
        }
        Ok(())
    }
}
