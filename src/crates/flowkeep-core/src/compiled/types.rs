//! Values returned by the compiled graph

use chrono::{DateTime, Utc};
use flowkeep_checkpoint::{Checkpoint, CheckpointId, CheckpointSource, NextStep, StepStatus};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

use crate::error::Result;
use crate::interrupt::InterruptMarker;
use crate::state::WorkflowState;

/// How an `invoke` or `resume` call ended
///
/// Serializes as `{"outcome": "completed" | "interrupted", "data": ...}` so
/// state keys never share a namespace with the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "data", rename_all = "lowercase")]
pub enum RunOutcome {
    /// The thread reached `END`; carries the final state
    Completed(WorkflowState),

    /// The thread paused before an interrupt point
    Interrupted(InterruptMarker),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunOutcome::Interrupted(_))
    }

    /// State at the end of the call, either final or at the pause
    pub fn state(&self) -> &WorkflowState {
        match self {
            RunOutcome::Completed(state) => state,
            RunOutcome::Interrupted(marker) => &marker.state,
        }
    }

    pub fn into_state(self) -> WorkflowState {
        match self {
            RunOutcome::Completed(state) => state,
            RunOutcome::Interrupted(marker) => marker.state,
        }
    }

    pub fn interrupt(&self) -> Option<&InterruptMarker> {
        match self {
            RunOutcome::Interrupted(marker) => Some(marker),
            RunOutcome::Completed(_) => None,
        }
    }
}

/// One checkpoint of a thread, as seen by callers
///
/// Emitted by `stream()` once per executed step and returned by
/// `get_state()` / `get_state_history()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub thread_id: String,
    pub step_index: u64,
    pub checkpoint_id: CheckpointId,

    /// Node whose step produced the snapshot; `None` for the input checkpoint
    pub node: Option<String>,

    pub source: CheckpointSource,
    pub status: StepStatus,
    pub error: Option<String>,

    /// Full state after the step
    pub values: WorkflowState,

    pub next: NextStep,
    pub created_at: DateTime<Utc>,
}

impl From<Checkpoint> for StateSnapshot {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            thread_id: checkpoint.thread_id,
            step_index: checkpoint.step_index,
            checkpoint_id: checkpoint.id,
            node: checkpoint.metadata.node,
            source: checkpoint.metadata.source,
            status: checkpoint.metadata.status,
            error: checkpoint.metadata.error,
            values: WorkflowState::from(checkpoint.values),
            next: checkpoint.next,
            created_at: checkpoint.ts,
        }
    }
}

/// Lifecycle phase of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Running,
    Interrupted,
    Completed,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Running => "running",
            RunPhase::Interrupted => "interrupted",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of where a thread stands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadStatus {
    pub thread_id: String,
    pub phase: RunPhase,

    /// Node that runs next; `None` once completed
    pub pending_node: Option<String>,

    /// Index of the latest checkpoint
    pub step_index: u64,

    /// Handler error of the latest step, for failed threads
    pub error: Option<String>,
}

/// Async stream of state snapshots
pub type StateSnapshotStream = Pin<Box<dyn Stream<Item = Result<StateSnapshot>> + Send>>;
