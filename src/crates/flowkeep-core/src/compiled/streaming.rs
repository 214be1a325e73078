//! Streaming execution

use super::runner::{Step, ThreadRun};
use super::{CompiledGraph, StateSnapshotStream};
use crate::state::WorkflowState;

impl CompiledGraph {
    /// Drive a thread lazily, yielding one snapshot per executed step.
    ///
    /// Nothing runs until the stream is polled. The stream ends when the
    /// thread completes or pauses before an interrupt point (use
    /// [`get_status`](Self::get_status) to tell which), and yields the error
    /// and stops on failure. Dropping the stream early leaves the thread at
    /// its last checkpoint; `invoke` picks it up from there.
    ///
    /// ```rust
    /// use flowkeep_core::{StateGraph, StateUpdate, WorkflowState, END, START};
    /// use futures::StreamExt;
    /// use serde_json::json;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> flowkeep_core::Result<()> {
    /// let mut graph = StateGraph::new();
    /// graph.add_node("a", |_| Box::pin(async { Ok(StateUpdate::new().with("a", json!(1))) }));
    /// graph.add_node("b", |_| Box::pin(async { Ok(StateUpdate::new().with("b", json!(2))) }));
    /// graph.add_edge(START, "a").add_edge("a", "b").add_edge("b", END);
    ///
    /// let compiled = graph.compile()?;
    /// let steps: Vec<_> = compiled.stream("t-1", WorkflowState::new()).collect().await;
    ///
    /// assert_eq!(steps.len(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub fn stream(&self, thread_id: impl Into<String>, initial: WorkflowState) -> StateSnapshotStream {
        let graph = self.clone();
        let thread_id = thread_id.into();

        Box::pin(async_stream::stream! {
            let _guard = match graph.claim(&thread_id) {
                Ok(guard) => guard,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            let mut run = match ThreadRun::load(&graph, &thread_id, initial).await {
                Ok(run) => run,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            loop {
                match run.step().await {
                    Ok(Step::Executed(snapshot)) => {
                        yield Ok(snapshot);
                    }
                    Ok(Step::Interrupted(_)) | Ok(Step::Finished) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        })
    }
}
