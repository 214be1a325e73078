//! StateGraph builder
//!
//! [`StateGraph`] collects nodes, edges, interrupt points and the state schema,
//! then [`compile`](StateGraph::compile)s them into an immutable
//! [`CompiledGraph`]. Every structural problem surfaces from `compile()` as
//! [`GraphError::Definition`]; the `add_*` methods never fail, so a graph can
//! be declared in any order.
//!
//! # Example
//!
//! ```rust
//! use flowkeep_core::{StateGraph, StateUpdate, END, START};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! let mut graph = StateGraph::new();
//!
//! graph.add_node("draft", |_state| {
//!     Box::pin(async move { Ok(StateUpdate::new().with("post_content", json!("..."))) })
//! });
//! graph.add_node("review", |_state| Box::pin(async move { Ok(StateUpdate::new()) }));
//!
//! graph.add_edge(START, "draft");
//! graph.add_edge("draft", "review");
//! graph.add_conditional_edge(
//!     "review",
//!     |state: &flowkeep_core::WorkflowState| {
//!         if state.get_bool("approved") == Some(true) {
//!             "approved".to_string()
//!         } else {
//!             "rejected".to_string()
//!         }
//!     },
//!     HashMap::from([("approved", END), ("rejected", "draft")]),
//! );
//! graph.interrupt_before(["review"]);
//!
//! let compiled = graph.compile().expect("valid graph");
//! assert_eq!(compiled.entry(), "draft");
//! ```

use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{handler_fn, Graph, HandlerResult, NodeHandler, NodeId, Router, END, START};
use crate::interrupt::InterruptController;
use crate::state::{MergePolicy, StateSchema, WorkflowState};

/// Builder for workflow graphs
pub struct StateGraph {
    graph: Graph,
    schema: StateSchema,
    interrupt_before: Vec<NodeId>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            schema: StateSchema::new(),
            interrupt_before: Vec::new(),
        }
    }

    /// Start from a state schema declaring per-field merge policies
    pub fn with_schema(schema: StateSchema) -> Self {
        Self {
            schema,
            ..Self::new()
        }
    }

    /// Declare one field's merge policy
    pub fn add_field(&mut self, name: impl Into<String>, policy: MergePolicy) -> &mut Self {
        self.schema.add_field(name, policy);
        self
    }

    /// Adds a node backed by an async closure
    ///
    /// The closure receives an owned snapshot of the state and returns the
    /// partial update for this step.
    pub fn add_node<F>(&mut self, id: impl Into<NodeId>, func: F) -> &mut Self
    where
        F: Fn(WorkflowState) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static,
    {
        self.add_handler(id, Arc::new(handler_fn(func)))
    }

    /// Adds a node backed by a [`NodeHandler`] implementation
    pub fn add_handler(&mut self, id: impl Into<NodeId>, handler: Arc<dyn NodeHandler>) -> &mut Self {
        self.graph.add_node(id.into(), handler);
        self
    }

    /// Adds a direct edge; `from = START` designates the start node
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(from.into(), to.into());
        self
    }

    /// Adds a conditional edge with a closed `{label: target}` mapping
    pub fn add_conditional_edge<R, L, T>(
        &mut self,
        from: impl Into<NodeId>,
        router: R,
        branches: HashMap<L, T>,
    ) -> &mut Self
    where
        R: Router + 'static,
        L: Into<String>,
        T: Into<NodeId>,
    {
        let branches: BTreeMap<String, NodeId> = branches
            .into_iter()
            .map(|(label, to)| (label.into(), to.into()))
            .collect();
        self.graph
            .add_conditional_edge(from.into(), Arc::new(router), branches);
        self
    }

    /// Set the start node (same as `add_edge(START, node)`)
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.add_edge(START, node)
    }

    /// Add a finish point (edge to END)
    pub fn add_finish(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.add_edge(node, END)
    }

    /// Pause before these nodes run until the thread is resumed
    pub fn interrupt_before<I, S>(&mut self, nodes: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.interrupt_before
            .extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Validate the definition and build the engine
    ///
    /// # Errors
    ///
    /// [`GraphError::Definition`] when:
    /// - a node name is duplicated, empty, or reserved
    /// - there is not exactly one start edge
    /// - an edge source or target does not exist
    /// - a node has no outgoing edge, or more than one
    /// - a router declares a label its mapping lacks
    /// - an interrupt point names a missing node
    /// - a node cannot be reached from the start
    pub fn compile(self) -> Result<CompiledGraph> {
        self.graph.validate().map_err(GraphError::Definition)?;

        for node in &self.interrupt_before {
            if self.graph.node(node).is_none() {
                return Err(GraphError::Definition(format!(
                    "interrupt point '{}' is not a node",
                    node
                )));
            }
        }

        let interrupts = InterruptController::new(self.interrupt_before);
        tracing::debug!(
            nodes = self.graph.nodes.len(),
            interrupts = ?interrupts.points(),
            "Compiled graph"
        );

        CompiledGraph::new(self.graph, self.schema, interrupts)
    }
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LabeledRouter;
    use crate::state::StateUpdate;

    fn noop(graph: &mut StateGraph, id: &str) {
        graph.add_node(id, |_state| Box::pin(async { Ok(StateUpdate::new()) }));
    }

    fn definition_error(graph: StateGraph) -> String {
        match graph.compile() {
            Err(GraphError::Definition(msg)) => msg,
            Err(other) => panic!("expected definition error, got {other}"),
            Ok(_) => panic!("expected definition error, graph compiled"),
        }
    }

    #[test]
    fn test_compile_linear() {
        let mut graph = StateGraph::new();
        noop(&mut graph, "a");
        noop(&mut graph, "b");
        graph.set_entry("a").add_edge("a", "b").add_finish("b");

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.entry(), "a");
    }

    #[test]
    fn test_missing_start() {
        let mut graph = StateGraph::new();
        noop(&mut graph, "a");
        graph.add_finish("a");
        assert!(definition_error(graph).contains("no start"));
    }

    #[test]
    fn test_duplicate_node() {
        let mut graph = StateGraph::new();
        noop(&mut graph, "a");
        noop(&mut graph, "a");
        graph.set_entry("a").add_finish("a");
        assert!(definition_error(graph).contains("more than once"));
    }

    #[test]
    fn test_reserved_name() {
        let mut graph = StateGraph::new();
        noop(&mut graph, END);
        graph.set_entry(END);
        assert!(definition_error(graph).contains("reserved"));
    }

    #[test]
    fn test_node_without_outgoing_edge() {
        let mut graph = StateGraph::new();
        noop(&mut graph, "a");
        noop(&mut graph, "b");
        graph.set_entry("a").add_edge("a", "b");
        assert!(definition_error(graph).contains("'b' has no outgoing edge"));
    }

    #[test]
    fn test_node_with_two_outgoing_edges() {
        let mut graph = StateGraph::new();
        noop(&mut graph, "a");
        noop(&mut graph, "b");
        graph.set_entry("a").add_edge("a", "b").add_finish("a").add_finish("b");
        assert!(definition_error(graph).contains("2 outgoing edges"));
    }

    #[test]
    fn test_unmapped_declared_label() {
        let mut graph = StateGraph::new();
        noop(&mut graph, "a");
        noop(&mut graph, "b");
        graph.set_entry("a").add_finish("b");
        graph.add_conditional_edge(
            "a",
            LabeledRouter::new(["go", "stop"], |_: &WorkflowState| "go".to_string()),
            HashMap::from([("go", "b")]),
        );
        assert!(definition_error(graph).contains("'stop'"));
    }

    #[test]
    fn test_interrupt_must_name_node() {
        let mut graph = StateGraph::new();
        noop(&mut graph, "a");
        graph.set_entry("a").add_finish("a");
        graph.interrupt_before(["review"]);
        assert!(definition_error(graph).contains("interrupt point 'review'"));
    }

    #[test]
    fn test_schema_fields_carried_into_compiled_graph() {
        let mut graph = StateGraph::new();
        noop(&mut graph, "a");
        graph.set_entry("a").add_finish("a");
        graph.add_field("evaluator_feedback", MergePolicy::Append);

        let compiled = graph.compile().unwrap();
        assert_eq!(
            compiled.schema().policy("evaluator_feedback"),
            MergePolicy::Append
        );
        assert_eq!(compiled.schema().policy("grade"), MergePolicy::Replace);
    }
}
