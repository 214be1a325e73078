//! Graph execution methods (invoke, resume, spawn)

use tokio::task::JoinHandle;

use super::runner::ThreadRun;
use super::types::RunOutcome;
use super::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::state::{StateUpdate, WorkflowState};

impl CompiledGraph {
    /// Run a thread until it completes or pauses.
    ///
    /// A thread with no checkpoints starts at the start node with `initial`.
    /// Otherwise `initial` is ignored and the thread continues from its latest
    /// checkpoint:
    ///
    /// - paused at an interrupt point: returns the same marker again
    /// - completed: returns the final state without running anything
    /// - failed: runs the failed node again
    ///
    /// # Errors
    ///
    /// - [`GraphError::ThreadBusy`] if the thread is already running on this engine
    /// - [`GraphError::NodeExecution`] after recording the failed step
    /// - [`GraphError::Routing`] / [`GraphError::Persistence`], leaving the
    ///   previous checkpoint as the latest
    ///
    /// # Example
    ///
    /// ```rust
    /// use flowkeep_core::{StateGraph, StateUpdate, WorkflowState, END, START};
    /// use serde_json::json;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> flowkeep_core::Result<()> {
    /// let mut graph = StateGraph::new();
    /// graph.add_node("greet", |state| {
    ///     Box::pin(async move {
    ///         let name = state.get_str("name").unwrap_or("world").to_string();
    ///         Ok(StateUpdate::new().with("greeting", json!(format!("hello {name}"))))
    ///     })
    /// });
    /// graph.add_edge(START, "greet").add_edge("greet", END);
    ///
    /// let compiled = graph.compile()?;
    /// let outcome = compiled
    ///     .invoke("t-1", WorkflowState::new().with("name", json!("ada")))
    ///     .await?;
    ///
    /// assert_eq!(outcome.state().get_str("greeting"), Some("hello ada"));
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip_all, fields(thread_id = %thread_id))]
    pub async fn invoke(&self, thread_id: &str, initial: WorkflowState) -> Result<RunOutcome> {
        let _guard = self.claim(thread_id)?;
        let run = ThreadRun::load(self, thread_id, initial).await?;
        run.run_to_end().await
    }

    /// Continue a thread paused before `as_node`.
    ///
    /// `update` is merged as though `as_node`'s handler had returned it, the
    /// step is checkpointed with source `resume`, and the thread carries on
    /// along `as_node`'s outgoing edge. The node's handler is not called.
    ///
    /// # Errors
    ///
    /// [`GraphError::ResumeState`] unless the latest checkpoint is waiting at
    /// `as_node` and `as_node` is an interrupt point. Everything
    /// [`invoke`](Self::invoke) can return otherwise.
    #[tracing::instrument(skip_all, fields(thread_id = %thread_id, as_node = %as_node))]
    pub async fn resume(
        &self,
        thread_id: &str,
        update: StateUpdate,
        as_node: &str,
    ) -> Result<RunOutcome> {
        let _guard = self.claim(thread_id)?;

        let mut run = ThreadRun::open(self, thread_id).await?.ok_or_else(|| {
            GraphError::resume_state(thread_id, 0, "thread has no checkpoints")
        })?;

        run.resume(update, as_node).await?;
        tracing::info!(step = run.step_index(), "Resumed thread");

        run.run_to_end().await
    }

    /// Run [`invoke`](Self::invoke) on its own tokio task
    ///
    /// Independent threads spawned this way progress concurrently; a slow
    /// handler in one never holds up another.
    pub fn spawn(
        &self,
        thread_id: impl Into<String>,
        initial: WorkflowState,
    ) -> JoinHandle<Result<RunOutcome>> {
        let graph = self.clone();
        let thread_id = thread_id.into();
        tokio::spawn(async move { graph.invoke(&thread_id, initial).await })
    }
}
