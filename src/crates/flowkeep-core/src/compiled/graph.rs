//! CompiledGraph struct and builder methods

use flowkeep_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::interrupt::InterruptController;
use crate::state::StateSchema;

/// Compiled graph ready for execution
///
/// Cheap to clone; clones share the topology, the checkpoint store and the
/// registry of threads currently running on this engine.
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) graph: Arc<Graph>,
    pub(crate) schema: Arc<StateSchema>,
    pub(crate) interrupts: Arc<InterruptController>,
    pub(crate) checkpoint_saver: Arc<dyn CheckpointSaver>,
    pub(crate) entry: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl CompiledGraph {
    /// Create a new compiled graph from a validated topology
    pub(crate) fn new(
        graph: Graph,
        schema: StateSchema,
        interrupts: InterruptController,
    ) -> Result<Self> {
        let entry = graph
            .entry()
            .cloned()
            .ok_or_else(|| GraphError::definition("graph has no start node"))?;

        Ok(Self {
            graph: Arc::new(graph),
            schema: Arc::new(schema),
            interrupts: Arc::new(interrupts),
            checkpoint_saver: Arc::new(InMemoryCheckpointSaver::new()),
            entry,
            active: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Set the checkpoint saver
    ///
    /// Without one, checkpoints live in a private in-memory store that
    /// disappears with the engine.
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpoint_saver = saver;
        self
    }

    pub fn checkpointer(&self) -> Arc<dyn CheckpointSaver> {
        Arc::clone(&self.checkpoint_saver)
    }

    /// Name of the start node
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Get a reference to the underlying graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.graph.node_names().map(String::as_str).collect()
    }

    pub fn interrupt_points(&self) -> Vec<&str> {
        self.interrupts.points()
    }

    /// Whether an invocation of `thread_id` is running on this engine
    pub fn is_active(&self, thread_id: &str) -> bool {
        self.active.lock().contains(thread_id)
    }

    /// Mark `thread_id` as running until the guard drops
    pub(crate) fn claim(&self, thread_id: &str) -> Result<ThreadGuard> {
        let mut active = self.active.lock();
        if !active.insert(thread_id.to_string()) {
            return Err(GraphError::ThreadBusy {
                thread_id: thread_id.to_string(),
            });
        }
        Ok(ThreadGuard {
            active: Arc::clone(&self.active),
            thread_id: thread_id.to_string(),
        })
    }
}

/// Releases a thread claimed with [`CompiledGraph::claim`]
pub(crate) struct ThreadGuard {
    active: Arc<Mutex<HashSet<String>>>,
    thread_id: String,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.thread_id);
    }
}
