//! Storage trait for checkpoint backends
//!
//! [`CheckpointSaver`] is the seam between the execution engine and durable
//! storage. The engine only ever appends to a thread's log and reads it back;
//! it never updates or deletes individual entries.
//!
//! # Contract
//!
//! - **`setup()`** prepares the backend (tables, directories). Calling it more
//!   than once must be harmless.
//! - **`append()`** is atomic: either the whole checkpoint becomes visible or
//!   none of it does. The checkpoint's `step_index` must be `latest + 1`, or `0`
//!   for a thread with no history. Anything else fails with
//!   [`CheckpointError::Conflict`](crate::CheckpointError::Conflict), which is
//!   how two writers racing on the same thread are kept from interleaving.
//! - **`latest()`** returns the highest-index checkpoint, or `None`.
//! - **`history()`** streams the whole log in ascending step order.
//!
//! Different threads are independent; implementations must be `Send + Sync`
//! and safe to share behind an `Arc` across tokio tasks.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use flowkeep_checkpoint::{Checkpoint, CheckpointSaver, CheckpointStream, Result};
//! use async_trait::async_trait;
//!
//! struct RedisCheckpointSaver { /* ... */ }
//!
//! #[async_trait]
//! impl CheckpointSaver for RedisCheckpointSaver {
//!     async fn append(&self, checkpoint: &Checkpoint) -> Result<()> {
//!         // WATCH the thread key, compare its length with step_index, MULTI/EXEC the push
//!         todo!()
//!     }
//!
//!     async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
//!         todo!()
//!     }
//!
//!     async fn history(&self, thread_id: &str) -> Result<CheckpointStream> {
//!         todo!()
//!     }
//!
//!     async fn thread_ids(&self) -> Result<Vec<String>> {
//!         todo!()
//!     }
//!
//!     async fn delete_thread(&self, thread_id: &str) -> Result<()> {
//!         todo!()
//!     }
//! }
//! ```
//!
//! # See Also
//!
//! - [`InMemoryCheckpointSaver`](crate::memory::InMemoryCheckpointSaver) - Reference implementation
//! - [`SqliteCheckpointSaver`](crate::sqlite::SqliteCheckpointSaver) - Durable single-file backend

use crate::{
    checkpoint::Checkpoint,
    error::{CheckpointError, Result},
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Type alias for async stream of checkpoints
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<Checkpoint>> + Send + 'static>>;

/// Core trait for implementing checkpoint storage backends
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Initialise backing storage. Idempotent.
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Append one checkpoint to its thread's log.
    ///
    /// Fails with `Conflict` unless `checkpoint.step_index` is exactly one past
    /// the thread's current latest index (or `0` for a new thread).
    async fn append(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// The checkpoint with the highest index for `thread_id`
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Every checkpoint for `thread_id`, oldest first
    async fn history(&self, thread_id: &str) -> Result<CheckpointStream>;

    /// IDs of all threads with at least one checkpoint
    async fn thread_ids(&self) -> Result<Vec<String>>;

    /// Delete all checkpoints associated with a specific thread ID
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}

/// Check that `checkpoint` extends a log whose last index is `latest`.
///
/// Shared by the bundled backends so they agree on what counts as a conflict.
pub fn ensure_next_step(latest: Option<u64>, checkpoint: &Checkpoint) -> Result<()> {
    let expected = latest.map_or(0, |step| step + 1);
    if checkpoint.step_index != expected {
        return Err(CheckpointError::Conflict {
            thread_id: checkpoint.thread_id.clone(),
            expected,
            actual: checkpoint.step_index,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::NextStep;
    use serde_json::Map;

    #[test]
    fn test_first_append_must_be_step_zero() {
        let zero = Checkpoint::new("t", 0, Map::new(), NextStep::End);
        let one = Checkpoint::new("t", 1, Map::new(), NextStep::End);

        assert!(ensure_next_step(None, &zero).is_ok());
        let err = ensure_next_step(None, &one).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_gaps_and_duplicates_conflict() {
        let dup = Checkpoint::new("t", 4, Map::new(), NextStep::End);
        let gap = Checkpoint::new("t", 6, Map::new(), NextStep::End);
        let ok = Checkpoint::new("t", 5, Map::new(), NextStep::End);

        assert!(ensure_next_step(Some(4), &dup).is_err());
        assert!(ensure_next_step(Some(4), &gap).is_err());
        assert!(ensure_next_step(Some(4), &ok).is_ok());
    }
}
