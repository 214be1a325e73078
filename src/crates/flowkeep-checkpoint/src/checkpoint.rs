//! Core checkpoint data structures
//!
//! A **[`Checkpoint`]** is one immutable entry in a thread's append-only log. The
//! engine writes exactly one checkpoint per executed step, plus an `input`
//! checkpoint at step 0 when a thread is first started. Each entry carries the
//! complete state after the step and the position the thread resumes from.
//!
//! # Core Types
//!
//! - [`Checkpoint`] - Snapshot of a thread at a step boundary
//! - [`CheckpointMetadata`] - Source, producing node, status and error text
//! - [`NextStep`] - Node to run next, or the terminal marker
//! - [`CheckpointSource`] - Origin of a checkpoint (Input, Loop, Resume)
//! - [`StepStatus`] - Whether the step completed or its handler failed
//!
//! # Step numbering
//!
//! ```text
//! step 0   input    state = initial state        next = start node
//! step 1   loop     state after start node       next = routed target
//! ...
//! step n   loop     state after node n           next = END | node | interrupt node
//! step n+1 resume   state after human update     next = target after interrupt node
//! ```
//!
//! Indices are contiguous per thread. Backends reject any append whose
//! `step_index` is not exactly one past the current latest entry.
//!
//! # Example
//!
//! ```rust
//! use flowkeep_checkpoint::{Checkpoint, CheckpointSource, NextStep};
//! use serde_json::{json, Map};
//!
//! let mut values = Map::new();
//! values.insert("topic".to_string(), json!("admissions"));
//!
//! let checkpoint = Checkpoint::new("post-1", 0, values, NextStep::node("intake"))
//!     .with_source(CheckpointSource::Input);
//!
//! assert_eq!(checkpoint.step_index, 0);
//! assert_eq!(checkpoint.next.node_name(), Some("intake"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CheckpointError;

/// Checkpoint ID type
pub type CheckpointId = String;

/// Origin of a checkpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Initial state recorded when a thread is first invoked
    Input,
    /// Written by the execution loop after a node ran
    Loop,
    /// Written when an external update is merged on behalf of an interrupted node
    Resume,
}

impl CheckpointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointSource::Input => "input",
            CheckpointSource::Loop => "loop",
            CheckpointSource::Resume => "resume",
        }
    }
}

impl fmt::Display for CheckpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointSource {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(CheckpointSource::Input),
            "loop" => Ok(CheckpointSource::Loop),
            "resume" => Ok(CheckpointSource::Resume),
            other => Err(CheckpointError::Invalid(format!(
                "unknown checkpoint source '{}'",
                other
            ))),
        }
    }
}

/// Outcome of the step a checkpoint records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Completed,
    /// The node handler returned an error; state is the pre-step state
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl FromStr for StepStatus {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            other => Err(CheckpointError::Invalid(format!(
                "unknown step status '{}'",
                other
            ))),
        }
    }
}

/// Where a thread continues from after a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "node", rename_all = "lowercase")]
pub enum NextStep {
    /// Run this node next
    Node(String),
    /// The thread has reached the terminal marker
    End,
}

impl NextStep {
    pub fn node(name: impl Into<String>) -> Self {
        NextStep::Node(name.into())
    }

    /// Name of the pending node, `None` once the thread has ended
    pub fn node_name(&self) -> Option<&str> {
        match self {
            NextStep::Node(name) => Some(name.as_str()),
            NextStep::End => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, NextStep::End)
    }
}

impl fmt::Display for NextStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextStep::Node(name) => f.write_str(name),
            NextStep::End => f.write_str("__end__"),
        }
    }
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    pub source: CheckpointSource,

    /// Node whose step produced this checkpoint (absent for the input checkpoint)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    pub status: StepStatus,

    /// Handler error text for failed steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for CheckpointMetadata {
    fn default() -> Self {
        Self {
            source: CheckpointSource::Loop,
            node: None,
            status: StepStatus::Completed,
            error: None,
        }
    }
}

/// State snapshot of one thread at a step boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// Unique ID of the checkpoint
    pub id: CheckpointId,

    pub thread_id: String,

    /// Position in the thread's log, contiguous from 0
    pub step_index: u64,

    /// The timestamp of the checkpoint
    pub ts: DateTime<Utc>,

    /// Complete thread state after the step
    pub values: Map<String, Value>,

    /// Where execution continues from
    pub next: NextStep,

    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a completed `loop` checkpoint with a fresh ID
    pub fn new(
        thread_id: impl Into<String>,
        step_index: u64,
        values: Map<String, Value>,
        next: NextStep,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            step_index,
            ts: Utc::now(),
            values,
            next,
            metadata: CheckpointMetadata::default(),
        }
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.metadata.source = source;
        self
    }

    /// Record the node whose step produced this checkpoint
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.metadata.node = Some(node.into());
        self
    }

    /// Mark the step as failed with the handler's error text
    pub fn with_failure(mut self, error: impl Into<String>) -> Self {
        self.metadata.status = StepStatus::Failed;
        self.metadata.error = Some(error.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.metadata.status == StepStatus::Failed
    }

    /// Reject checkpoints no backend should accept
    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }
        if self.v != Self::CURRENT_VERSION {
            return Err(CheckpointError::Invalid(format!(
                "unsupported checkpoint format version {}",
                self.v
            )));
        }
        Ok(())
    }
}
