//! Error types for graph definition and execution
//!
//! Every failure that happens while a thread is running carries the thread ID
//! and the step index it happened at, so callers can line the error up with the
//! thread's checkpoint history.
//!
//! # Error Categories
//!
//! - **Construction**: `Definition`
//! - **Input**: `InvalidState`
//! - **Execution**: `Routing`, `Topology`, `NodeExecution`
//! - **Persistence**: `Persistence` (writes), `Checkpoint` (reads)
//! - **Control**: `ResumeState`, `ThreadBusy`
//!
//! # Matching Errors
//!
//! ```rust
//! use flowkeep_core::error::GraphError;
//!
//! fn describe(err: &GraphError) -> String {
//!     match err {
//!         GraphError::Routing { node, label, .. } => {
//!             format!("router after '{}' chose unknown label '{}'", node, label)
//!         }
//!         GraphError::NodeExecution { node, source, .. } => {
//!             format!("'{}' failed: {}", node, source)
//!         }
//!         other => other.to_string(),
//!     }
//! }
//! ```

use flowkeep_checkpoint::CheckpointError;
use thiserror::Error;

use crate::graph::HandlerError;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Error type for all graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    ///
    /// Raised by `compile()`; no engine is constructed.
    #[error("Graph definition invalid: {0}")]
    Definition(String),

    /// A value that should have been a state object was not
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A router emitted a label missing from its edge's mapping
    ///
    /// Nothing is persisted for the step; the previous checkpoint stays the
    /// recovery point.
    #[error("Thread '{thread_id}' step {step_index}: router after '{node}' returned unmapped label '{label}'")]
    Routing {
        thread_id: String,
        step_index: u64,
        node: String,
        label: String,
    },

    /// A stored thread points at a node or edge this graph does not have
    ///
    /// Raised when a thread is resumed with a different graph than the one
    /// that wrote its checkpoints. Nothing is persisted.
    #[error("Thread '{thread_id}' step {step_index}: {message}")]
    Topology {
        thread_id: String,
        step_index: u64,
        message: String,
    },

    /// The checkpoint store could not record a step
    #[error("Thread '{thread_id}' step {step_index}: failed to persist checkpoint: {source}")]
    Persistence {
        thread_id: String,
        step_index: u64,
        #[source]
        source: CheckpointError,
    },

    /// Reading a thread's checkpoints failed
    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A node handler returned an error
    ///
    /// The step is recorded as a failed checkpoint before this is returned.
    #[error("Thread '{thread_id}' step {step_index}: node '{node}' failed: {source}")]
    NodeExecution {
        thread_id: String,
        step_index: u64,
        node: String,
        #[source]
        source: HandlerError,
    },

    /// `resume` was called on a thread that is not waiting at the given node
    #[error("Thread '{thread_id}' step {step_index}: cannot resume: {reason}")]
    ResumeState {
        thread_id: String,
        step_index: u64,
        reason: String,
    },

    /// Another invocation of this thread is already running on this engine
    #[error("Thread '{thread_id}' is already running")]
    ThreadBusy { thread_id: String },
}

impl GraphError {
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }

    pub fn resume_state(
        thread_id: impl Into<String>,
        step_index: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self::ResumeState {
            thread_id: thread_id.into(),
            step_index,
            reason: reason.into(),
        }
    }

    /// Thread the error belongs to, for run-time errors
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            GraphError::Routing { thread_id, .. }
            | GraphError::Topology { thread_id, .. }
            | GraphError::Persistence { thread_id, .. }
            | GraphError::NodeExecution { thread_id, .. }
            | GraphError::ResumeState { thread_id, .. }
            | GraphError::ThreadBusy { thread_id } => Some(thread_id),
            GraphError::Definition(_)
            | GraphError::InvalidState(_)
            | GraphError::Checkpoint(_) => None,
        }
    }

    /// Step index the error happened at, for run-time errors
    pub fn step_index(&self) -> Option<u64> {
        match self {
            GraphError::Routing { step_index, .. }
            | GraphError::Topology { step_index, .. }
            | GraphError::Persistence { step_index, .. }
            | GraphError::NodeExecution { step_index, .. }
            | GraphError::ResumeState { step_index, .. } => Some(*step_index),
            _ => None,
        }
    }
}
