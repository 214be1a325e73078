//! In-memory checkpoint storage
//!
//! [`InMemoryCheckpointSaver`] keeps every thread's log in a
//! `HashMap<String, Vec<Checkpoint>>` behind a tokio `RwLock`. The contiguity
//! check and the push happen under one write guard, so concurrent appends to
//! the same thread are serialised and the loser sees a `Conflict`.
//!
//! Nothing survives the process; use it for tests and short-lived runs, and
//! [`SqliteCheckpointSaver`](crate::sqlite::SqliteCheckpointSaver) when threads
//! must outlive a restart.
//!
//! ```rust
//! use flowkeep_checkpoint::{Checkpoint, CheckpointSaver, InMemoryCheckpointSaver, NextStep};
//! use serde_json::Map;
//!
//! # #[tokio::main]
//! # async fn main() -> flowkeep_checkpoint::Result<()> {
//! let saver = InMemoryCheckpointSaver::new();
//! saver.append(&Checkpoint::new("t-1", 0, Map::new(), NextStep::node("intake"))).await?;
//!
//! let latest = saver.latest("t-1").await?.expect("checkpoint");
//! assert_eq!(latest.step_index, 0);
//! # Ok(())
//! # }
//! ```

use crate::{
    checkpoint::Checkpoint,
    error::Result,
    traits::{ensure_next_step, CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>;

/// In-memory checkpoint saver implementation
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn append(&self, checkpoint: &Checkpoint) -> Result<()> {
        checkpoint.validate()?;

        let mut storage = self.storage.write().await;
        let latest = storage
            .get(&checkpoint.thread_id)
            .and_then(|entries| entries.last())
            .map(|c| c.step_index);
        ensure_next_step(latest, checkpoint)?;

        storage
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint.clone());

        tracing::debug!(
            thread_id = %checkpoint.thread_id,
            step = checkpoint.step_index,
            "Appended checkpoint"
        );
        Ok(())
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn history(&self, thread_id: &str) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let entries: Vec<Result<Checkpoint>> = storage
            .get(thread_id)
            .map(|entries| entries.iter().cloned().map(Ok).collect())
            .unwrap_or_default();

        Ok(Box::pin(stream::iter(entries)))
    }

    async fn thread_ids(&self) -> Result<Vec<String>> {
        let storage = self.storage.read().await;
        let mut ids: Vec<String> = storage.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.remove(thread_id);
        Ok(())
    }
}
