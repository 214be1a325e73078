//! # flowkeep-checkpoint - Durable step log for workflow threads
//!
//! Every flowkeep thread keeps an **append-only log of checkpoints**: one entry
//! for the initial input and one for every step the engine executes. The log is
//! the only source of truth for resuming a thread, whether after an interrupt
//! that waits days for a human, a failed handler, or a process restart.
//!
//! ## Core Concepts
//!
//! ### 1. Checkpoint
//!
//! A [`Checkpoint`] records `(thread_id, step_index, state, next)` plus
//! [`CheckpointMetadata`] describing which node produced it and whether that
//! step failed. Indices start at 0 and never skip or repeat.
//!
//! ### 2. CheckpointSaver
//!
//! [`CheckpointSaver`] is the storage seam:
//!
//! - **`setup()`** - Idempotent initialisation
//! - **`append()`** - Atomic, contiguity-checked write
//! - **`latest()`** - Highest-index checkpoint of a thread
//! - **`history()`** - Full log, oldest first
//!
//! ### 3. Backends
//!
//! - [`InMemoryCheckpointSaver`] - Tests and ephemeral runs
//! - [`SqliteCheckpointSaver`] - Single-file durable storage (feature `sqlite`, on by default)
//!
//! ## Quick Start
//!
//! ```rust
//! use flowkeep_checkpoint::{
//!     Checkpoint, CheckpointSaver, CheckpointSource, InMemoryCheckpointSaver, NextStep,
//! };
//! use futures::StreamExt;
//! use serde_json::{json, Map};
//!
//! # #[tokio::main]
//! # async fn main() -> flowkeep_checkpoint::Result<()> {
//! let saver = InMemoryCheckpointSaver::new();
//! saver.setup().await?;
//!
//! let mut state = Map::new();
//! state.insert("topic".into(), json!("scholarships"));
//! saver
//!     .append(&Checkpoint::new("post-1", 0, state.clone(), NextStep::node("intake"))
//!         .with_source(CheckpointSource::Input))
//!     .await?;
//!
//! state.insert("summary".into(), json!("Deadlines move to March."));
//! saver
//!     .append(&Checkpoint::new("post-1", 1, state, NextStep::node("draft")).with_node("intake"))
//!     .await?;
//!
//! let history: Vec<_> = saver.history("post-1").await?.collect().await;
//! assert_eq!(history.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, NextStep, StepStatus,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointSaver;
pub use traits::{ensure_next_step, CheckpointSaver, CheckpointStream};
