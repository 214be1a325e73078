//! Static interrupt points and the marker returned when a thread pauses
//!
//! Interrupt points are fixed when the graph is compiled. Before running a
//! node, the engine asks the [`InterruptController`] whether that node is an
//! interrupt point; if so the handler is not called and the caller gets an
//! [`InterruptMarker`] instead. The pause costs nothing to keep: the thread's
//! latest checkpoint already points at the pending node, so the process may
//! exit and the thread can be resumed days later from another one.
//!
//! ```text
//! draft → evaluate → [review]  ← paused here, handler not run
//!                       │
//!          resume(thread, {approved: true}, "review")
//!                       ↓
//!                      END
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::graph::NodeId;
use crate::state::WorkflowState;

/// Set of nodes the engine pauses before
#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    interrupt_before: BTreeSet<NodeId>,
}

impl InterruptController {
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Self {
            interrupt_before: nodes.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if the engine should pause before `node`
    pub fn is_interrupt_point(&self, node: &str) -> bool {
        self.interrupt_before.contains(node)
    }

    pub fn points(&self) -> Vec<&str> {
        self.interrupt_before.iter().map(String::as_str).collect()
    }

    /// Build the marker handed back to the caller on pause
    pub fn marker(
        &self,
        thread_id: impl Into<String>,
        step_index: u64,
        checkpoint_id: impl Into<String>,
        pending_node: impl Into<NodeId>,
        state: WorkflowState,
    ) -> InterruptMarker {
        InterruptMarker {
            thread_id: thread_id.into(),
            step_index,
            checkpoint_id: checkpoint_id.into(),
            pending_node: pending_node.into(),
            state,
        }
    }
}

/// A thread paused before an interrupt point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptMarker {
    pub thread_id: String,

    /// Index of the checkpoint the thread is paused at
    pub step_index: u64,

    pub checkpoint_id: String,

    /// Node that will run, as if it produced the resume update, on resume
    pub pending_node: NodeId,

    /// Full state at the pause
    pub state: WorkflowState,
}
