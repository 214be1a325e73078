//! Error types for the flowkeep command-line application

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown thread '{0}'")]
    UnknownThread(String),

    #[error("Failed to render output: {0}")]
    Output(String),

    #[error("Invalid source timestamp for {url}: '{value}'")]
    SourceTimestamp { url: String, value: String },

    #[error(transparent)]
    Graph(#[from] flowkeep_core::GraphError),

    #[error(transparent)]
    Checkpoint(#[from] flowkeep_checkpoint::CheckpointError),
}

impl From<std::fmt::Error> for CliError {
    fn from(err: std::fmt::Error) -> Self {
        CliError::Output(err.to_string())
    }
}
