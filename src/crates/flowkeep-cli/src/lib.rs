//! # flowkeep - Durable drafting workflows from the command line
//!
//! Wires the flowkeep engine to a SQLite checkpoint file and ships one
//! reference workflow: drafting a post from a topic and a cached source,
//! with an evaluator loop and a human review pause.
//!
//! ## Features
//!
//! - **Durable threads** - Every step lands in `flowkeep.db`; a thread paused
//!   for review can be resumed by a later process
//! - **TOML configuration** - Database path, workflow tunables, logging and
//!   the seeded source catalog
//! - **Text or JSON output** - For people and for scripts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowkeep::{commands, load_config, OutputFormat};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = load_config("flowkeep.toml").await?;
//! let graph = commands::open_engine(&config).await?;
//!
//! let text = commands::handle_run(&graph, "post-1", "Housing", None, OutputFormat::Text).await?;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod commands;
pub mod config;
pub mod logging;
pub mod pipeline;

mod error;

pub use catalog::{MemoryCatalog, SourceCatalog, SourceRecord};
pub use commands::OutputFormat;
pub use config::{load_config, ConfigLoader, FlowkeepConfig};
pub use error::{CliError, Result};
pub use logging::init_logging;
pub use pipeline::DraftingWorkflow;
