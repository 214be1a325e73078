//! Per-thread step loop
//!
//! A [`ThreadRun`] mirrors a thread's latest checkpoint in memory and advances
//! it one step at a time. Every transition goes through [`ThreadRun::commit`]:
//!
//! ```text
//! merge update ──► resolve outgoing edge ──► append checkpoint ──► adopt new state
//!                        │                         │
//!                   Routing error            Persistence error
//!                  (nothing written)        (nothing adopted)
//! ```
//!
//! The in-memory position only moves after the store accepted the checkpoint,
//! so what a caller observes is never ahead of durable history.

use flowkeep_checkpoint::{Checkpoint, CheckpointId, CheckpointSource, NextStep};
use tracing::Instrument;

use super::types::{RunOutcome, StateSnapshot};
use super::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, HandlerError, END};
use crate::interrupt::InterruptMarker;
use crate::state::{StateUpdate, WorkflowState};

/// Result of attempting one step
pub(crate) enum Step {
    /// A node ran and its checkpoint was appended
    Executed(StateSnapshot),

    /// The pending node is an interrupt point; nothing ran
    Interrupted(InterruptMarker),

    /// The thread already reached `END`
    Finished,
}

pub(crate) struct ThreadRun {
    graph: CompiledGraph,
    thread_id: String,
    state: WorkflowState,
    next: NextStep,
    step_index: u64,
    checkpoint_id: CheckpointId,
    failed: bool,
}

impl ThreadRun {
    /// Pick up `thread_id` from its latest checkpoint, or start it with
    /// `initial` by writing the step-0 input checkpoint
    pub(crate) async fn load(
        graph: &CompiledGraph,
        thread_id: &str,
        initial: WorkflowState,
    ) -> Result<Self> {
        if let Some(latest) = graph.checkpoint_saver.latest(thread_id).await? {
            tracing::debug!(step = latest.step_index, next = %latest.next, "Resuming from latest checkpoint");
            return Ok(Self::from_checkpoint(graph.clone(), latest));
        }

        let checkpoint = Checkpoint::new(
            thread_id,
            0,
            initial.into_map(),
            NextStep::node(graph.entry()),
        )
        .with_source(CheckpointSource::Input);

        graph
            .checkpoint_saver
            .append(&checkpoint)
            .await
            .map_err(|source| GraphError::Persistence {
                thread_id: thread_id.to_string(),
                step_index: 0,
                source,
            })?;

        tracing::debug!(entry = graph.entry(), "Started thread");
        Ok(Self::from_checkpoint(graph.clone(), checkpoint))
    }

    /// Pick up an existing thread; `None` when it has no checkpoints
    pub(crate) async fn open(graph: &CompiledGraph, thread_id: &str) -> Result<Option<Self>> {
        let latest = graph.checkpoint_saver.latest(thread_id).await?;
        Ok(latest.map(|checkpoint| Self::from_checkpoint(graph.clone(), checkpoint)))
    }

    fn from_checkpoint(graph: CompiledGraph, checkpoint: Checkpoint) -> Self {
        let failed = checkpoint.is_failed();
        Self {
            graph,
            thread_id: checkpoint.thread_id,
            state: WorkflowState::from(checkpoint.values),
            next: checkpoint.next,
            step_index: checkpoint.step_index,
            checkpoint_id: checkpoint.id,
            failed,
        }
    }

    pub(crate) fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Run the pending node, if any, and record the result
    pub(crate) async fn step(&mut self) -> Result<Step> {
        let node = match &self.next {
            NextStep::End => return Ok(Step::Finished),
            NextStep::Node(node) => node.clone(),
        };

        if self.graph.interrupts.is_interrupt_point(&node) {
            tracing::info!(node = %node, step = self.step_index, "Interrupted before node");
            return Ok(Step::Interrupted(self.marker(&node)));
        }

        let handler = self.graph.graph.node(&node).cloned().ok_or_else(|| {
            tracing::error!(node = %node, "Thread is positioned at unknown node");
            GraphError::Topology {
                thread_id: self.thread_id.clone(),
                step_index: self.step_index,
                message: format!("thread is positioned at unknown node '{}'", node),
            }
        })?;

        let step_index = self.step_index + 1;
        let span = tracing::info_span!("step", thread_id = %self.thread_id, step = step_index, node = %node);

        match handler.handle(&self.state).instrument(span.clone()).await {
            Ok(update) => {
                let snapshot = self
                    .commit(&node, update, CheckpointSource::Loop)
                    .instrument(span)
                    .await?;
                Ok(Step::Executed(snapshot))
            }
            Err(source) => Err(self.record_failure(&node, source).instrument(span).await),
        }
    }

    /// Drive the thread until it completes or pauses
    pub(crate) async fn run_to_end(mut self) -> Result<RunOutcome> {
        loop {
            match self.step().await? {
                Step::Executed(_) => {}
                Step::Interrupted(marker) => return Ok(RunOutcome::Interrupted(marker)),
                Step::Finished => {
                    tracing::info!(step = self.step_index, "Thread completed");
                    return Ok(RunOutcome::Completed(self.state));
                }
            }
        }
    }

    /// Merge `update` on behalf of the interrupt node the thread is paused at
    pub(crate) async fn resume(&mut self, update: StateUpdate, as_node: &str) -> Result<StateSnapshot> {
        let reject = |reason: String| GraphError::resume_state(&self.thread_id, self.step_index, reason);

        if self.failed {
            return Err(reject(
                "the latest step failed; invoke the thread to retry it".to_string(),
            ));
        }

        match &self.next {
            NextStep::End => return Err(reject("thread has already completed".to_string())),
            NextStep::Node(pending) if !self.graph.interrupts.is_interrupt_point(pending) => {
                return Err(reject(format!(
                    "thread is not interrupted (next node '{}')",
                    pending
                )))
            }
            NextStep::Node(pending) if pending != as_node => {
                return Err(reject(format!(
                    "thread is interrupted at '{}', not '{}'",
                    pending, as_node
                )))
            }
            NextStep::Node(_) => {}
        }

        let span = tracing::info_span!("step", thread_id = %self.thread_id, step = self.step_index + 1, node = %as_node);
        self.commit(as_node, update, CheckpointSource::Resume)
            .instrument(span)
            .await
    }

    /// Merge, route, persist, then adopt
    async fn commit(
        &mut self,
        node: &str,
        update: StateUpdate,
        source: CheckpointSource,
    ) -> Result<StateSnapshot> {
        let step_index = self.step_index + 1;
        let merged = self.graph.schema.apply(&self.state, &update);
        let next = self.resolve_next(node, &merged, step_index)?;

        let checkpoint = Checkpoint::new(
            &self.thread_id,
            step_index,
            merged.clone().into_map(),
            next.clone(),
        )
        .with_source(source)
        .with_node(node);

        self.graph
            .checkpoint_saver
            .append(&checkpoint)
            .await
            .map_err(|source| {
                tracing::error!(error = %source, "Failed to persist checkpoint");
                GraphError::Persistence {
                    thread_id: self.thread_id.clone(),
                    step_index,
                    source,
                }
            })?;

        tracing::debug!(next = %next, source = %checkpoint.metadata.source, "Step committed");

        self.state = merged;
        self.next = next;
        self.step_index = step_index;
        self.checkpoint_id = checkpoint.id.clone();
        self.failed = false;

        Ok(StateSnapshot::from(checkpoint))
    }

    /// Follow `node`'s outgoing edge over the post-merge state
    fn resolve_next(&self, node: &str, state: &WorkflowState, step_index: u64) -> Result<NextStep> {
        let edge = self.graph.graph.outgoing(node).ok_or_else(|| GraphError::Topology {
            thread_id: self.thread_id.clone(),
            step_index,
            message: format!("node '{}' has no outgoing edge", node),
        })?;

        let target = match edge {
            Edge::Direct(to) => to,
            Edge::Conditional { router, branches } => {
                let label = router.route(state);
                match branches.get(&label) {
                    Some(to) => {
                        tracing::debug!(label = %label, target = %to, "Routed");
                        to
                    }
                    None => {
                        tracing::error!(label = %label, "Router returned unmapped label");
                        return Err(GraphError::Routing {
                            thread_id: self.thread_id.clone(),
                            step_index,
                            node: node.to_string(),
                            label,
                        });
                    }
                }
            }
        };

        Ok(if target == END {
            NextStep::End
        } else {
            NextStep::node(target.as_str())
        })
    }

    /// Append a failed checkpoint for `node` and build the error to surface
    ///
    /// The failed checkpoint keeps the pre-step state and points back at
    /// `node`, so invoking the thread again retries it.
    async fn record_failure(&mut self, node: &str, source: HandlerError) -> GraphError {
        let step_index = self.step_index + 1;
        tracing::error!(error = %source, "Node failed");

        let checkpoint = Checkpoint::new(
            &self.thread_id,
            step_index,
            self.state.clone().into_map(),
            NextStep::node(node),
        )
        .with_node(node)
        .with_failure(source.to_string());

        if let Err(store_error) = self.graph.checkpoint_saver.append(&checkpoint).await {
            tracing::error!(error = %store_error, "Failed to persist failed step");
            return GraphError::Persistence {
                thread_id: self.thread_id.clone(),
                step_index,
                source: store_error,
            };
        }

        self.step_index = step_index;
        self.checkpoint_id = checkpoint.id;
        self.failed = true;

        GraphError::NodeExecution {
            thread_id: self.thread_id.clone(),
            step_index,
            node: node.to_string(),
            source,
        }
    }

    fn marker(&self, node: &str) -> InterruptMarker {
        self.graph.interrupts.marker(
            &self.thread_id,
            self.step_index,
            &self.checkpoint_id,
            node,
            self.state.clone(),
        )
    }
}
