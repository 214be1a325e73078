//! Read-only thread inspection (status, latest state, history)

use flowkeep_checkpoint::NextStep;
use futures::StreamExt;

use super::types::{RunPhase, StateSnapshot, StateSnapshotStream, ThreadStatus};
use super::CompiledGraph;
use crate::error::{GraphError, Result};

impl CompiledGraph {
    /// Where a thread stands, from its latest checkpoint
    ///
    /// Returns `None` for a thread with no checkpoints.
    ///
    /// | Latest checkpoint | Phase |
    /// |-------------------|-------|
    /// | invocation active on this engine | `Running` |
    /// | failed step | `Failed` |
    /// | `next` is `END` | `Completed` |
    /// | `next` is an interrupt point | `Interrupted` |
    /// | `next` is any other node | `Running` (resumable with `invoke`) |
    pub async fn get_status(&self, thread_id: &str) -> Result<Option<ThreadStatus>> {
        let Some(latest) = self.checkpoint_saver.latest(thread_id).await? else {
            return Ok(None);
        };

        let phase = if self.is_active(thread_id) {
            RunPhase::Running
        } else if latest.is_failed() {
            RunPhase::Failed
        } else {
            match &latest.next {
                NextStep::End => RunPhase::Completed,
                NextStep::Node(node) if self.interrupts.is_interrupt_point(node) => {
                    RunPhase::Interrupted
                }
                NextStep::Node(_) => RunPhase::Running,
            }
        };

        Ok(Some(ThreadStatus {
            thread_id: thread_id.to_string(),
            phase,
            pending_node: latest.next.node_name().map(str::to_string),
            step_index: latest.step_index,
            error: latest.metadata.error,
        }))
    }

    /// The thread's latest checkpoint
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<StateSnapshot>> {
        let latest = self.checkpoint_saver.latest(thread_id).await?;
        Ok(latest.map(StateSnapshot::from))
    }

    /// Every checkpoint of the thread, oldest first
    pub async fn get_state_history(&self, thread_id: &str) -> Result<StateSnapshotStream> {
        let history = self.checkpoint_saver.history(thread_id).await?;
        let snapshots = history.map(|item| item.map(StateSnapshot::from).map_err(GraphError::from));
        Ok(Box::pin(snapshots))
    }
}
