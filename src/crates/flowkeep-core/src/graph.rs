//! Graph topology: nodes, edges, handlers and routers
//!
//! A [`Graph`] is a closed map of named nodes, each with exactly one outgoing
//! declaration: either a direct edge to a fixed target or a conditional edge
//! whose [`Router`] picks a label from a closed `{label: target}` mapping.
//!
//! - [`START`] is the virtual entry point; exactly one edge may leave it.
//! - [`END`] is the virtual terminal; any edge may point at it.
//!
//! Node work is plugged in through [`NodeHandler`]. Handlers see an immutable
//! view of the state and return a partial [`StateUpdate`]; collaborators
//! (HTTP clients, databases, models) are captured when the handler is built.
//!
//! ```rust
//! use flowkeep_core::graph::{handler_fn, NodeHandler};
//! use flowkeep_core::state::{StateUpdate, WorkflowState};
//! use serde_json::json;
//!
//! let summarize = handler_fn(|state: WorkflowState| {
//!     Box::pin(async move {
//!         let text = state.get_str("content").unwrap_or_default();
//!         let summary: String = text.chars().take(80).collect();
//!         Ok(StateUpdate::new().with("summary", json!(summary)))
//!     })
//! });
//! # let _ = summarize;
//! ```

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::state::{StateUpdate, WorkflowState};

/// Node identifier type
pub type NodeId = String;

/// Virtual entry point of every graph
pub const START: &str = "__start__";

/// Virtual terminal of every graph
pub const END: &str = "__end__";

/// Error a handler may return; carried verbatim inside `GraphError::NodeExecution`
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of running one node
pub type HandlerResult = std::result::Result<StateUpdate, HandlerError>;

/// Business logic of a single node
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(&self, state: &WorkflowState) -> HandlerResult;
}

/// Handler backed by an async closure that receives an owned state snapshot
pub struct FnHandler<F> {
    func: F,
}

/// Wrap a closure returning a boxed future as a [`NodeHandler`]
pub fn handler_fn<F>(func: F) -> FnHandler<F>
where
    F: Fn(WorkflowState) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static,
{
    FnHandler { func }
}

#[async_trait]
impl<F> NodeHandler for FnHandler<F>
where
    F: Fn(WorkflowState) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static,
{
    async fn handle(&self, state: &WorkflowState) -> HandlerResult {
        (self.func)(state.clone()).await
    }
}

/// Chooses a label from the post-merge state of a conditional edge's source
///
/// Routers are pure: same state in, same label out. Implementations that know
/// every label they can produce should return them from [`labels`](Router::labels)
/// so `compile()` can check the edge mapping up front.
pub trait Router: Send + Sync {
    fn route(&self, state: &WorkflowState) -> String;

    fn labels(&self) -> Option<Vec<String>> {
        None
    }
}

impl<F> Router for F
where
    F: Fn(&WorkflowState) -> String + Send + Sync,
{
    fn route(&self, state: &WorkflowState) -> String {
        self(state)
    }
}

/// Closure router with an explicit label set
pub struct LabeledRouter<F> {
    labels: Vec<String>,
    func: F,
}

impl<F> LabeledRouter<F>
where
    F: Fn(&WorkflowState) -> String + Send + Sync,
{
    pub fn new<I, S>(labels: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            func,
        }
    }
}

impl<F> Router for LabeledRouter<F>
where
    F: Fn(&WorkflowState) -> String + Send + Sync,
{
    fn route(&self, state: &WorkflowState) -> String {
        (self.func)(state)
    }

    fn labels(&self) -> Option<Vec<String>> {
        Some(self.labels.clone())
    }
}

/// Outgoing declaration of a node
#[derive(Clone)]
pub enum Edge {
    /// Always continue at this target
    Direct(NodeId),

    /// Let the router pick a label, then continue at the mapped target
    Conditional {
        router: Arc<dyn Router>,
        branches: BTreeMap<String, NodeId>,
    },
}

impl Edge {
    /// Every node this edge can lead to
    pub fn targets(&self) -> Vec<&NodeId> {
        match self {
            Edge::Direct(to) => vec![to],
            Edge::Conditional { branches, .. } => branches.values().collect(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("branches", branches)
                .finish_non_exhaustive(),
        }
    }
}

/// Topology under construction or compiled
#[derive(Clone, Default)]
pub struct Graph {
    pub(crate) nodes: BTreeMap<NodeId, Arc<dyn NodeHandler>>,
    pub(crate) edges: BTreeMap<NodeId, Vec<Edge>>,
    pub(crate) duplicates: Vec<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId, handler: Arc<dyn NodeHandler>) {
        if self.nodes.insert(id.clone(), handler).is_some() {
            self.duplicates.push(id);
        }
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.entry(from).or_default().push(Edge::Direct(to));
    }

    pub fn add_conditional_edge(
        &mut self,
        from: NodeId,
        router: Arc<dyn Router>,
        branches: BTreeMap<String, NodeId>,
    ) {
        self.edges
            .entry(from)
            .or_default()
            .push(Edge::Conditional { router, branches });
    }

    pub fn node(&self, id: &str) -> Option<&Arc<dyn NodeHandler>> {
        self.nodes.get(id)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// The single outgoing declaration of `id` (valid after `validate`)
    pub fn outgoing(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id).and_then(|edges| edges.first())
    }

    /// The node the `START` edge points at
    pub fn entry(&self) -> Option<&NodeId> {
        match self.edges.get(START).and_then(|edges| edges.first()) {
            Some(Edge::Direct(to)) => Some(to),
            _ => None,
        }
    }

    fn is_target(&self, id: &str) -> bool {
        id == END || self.nodes.contains_key(id)
    }

    /// Check the topology; the message names the first problem found
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("graph has no nodes".to_string());
        }

        if let Some(dup) = self.duplicates.first() {
            return Err(format!("node '{}' is defined more than once", dup));
        }

        for id in self.nodes.keys() {
            if id.is_empty() {
                return Err("node names must not be empty".to_string());
            }
            if id == START || id == END {
                return Err(format!("'{}' is reserved and cannot be a node", id));
            }
        }

        let entry = match self.edges.get(START).map(Vec::as_slice) {
            None | Some([]) => return Err("graph has no start node".to_string()),
            Some([Edge::Direct(to)]) => to,
            Some([Edge::Conditional { .. }]) => {
                return Err("the start edge must point at a single node".to_string())
            }
            Some(many) => {
                return Err(format!(
                    "graph has {} start edges, exactly one is required",
                    many.len()
                ))
            }
        };
        if !self.nodes.contains_key(entry) {
            return Err(format!("start node '{}' does not exist", entry));
        }

        for (from, edges) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(format!("edge source '{}' does not exist", from));
            }

            for edge in edges {
                match edge {
                    Edge::Direct(to) => {
                        if !self.is_target(to) {
                            return Err(format!("edge target '{}' does not exist", to));
                        }
                    }
                    Edge::Conditional { router, branches } => {
                        if branches.is_empty() {
                            return Err(format!(
                                "conditional edge from '{}' has no branches",
                                from
                            ));
                        }
                        for (label, to) in branches {
                            if !self.is_target(to) {
                                return Err(format!(
                                    "branch '{}' from '{}' targets missing node '{}'",
                                    label, from, to
                                ));
                            }
                        }
                        if let Some(labels) = router.labels() {
                            for label in labels {
                                if !branches.contains_key(&label) {
                                    return Err(format!(
                                        "router on '{}' can emit '{}' which has no branch",
                                        from, label
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        }

        for id in self.nodes.keys() {
            match self.edges.get(id).map_or(0, Vec::len) {
                1 => {}
                0 => return Err(format!("node '{}' has no outgoing edge", id)),
                n => {
                    return Err(format!(
                        "node '{}' has {} outgoing edges, exactly one is required",
                        id, n
                    ))
                }
            }
        }

        let reachable = self.reachable_from(entry);
        if let Some(orphan) = self.nodes.keys().find(|id| !reachable.contains(*id)) {
            return Err(format!("node '{}' is unreachable from the start", orphan));
        }

        Ok(())
    }

    /// Nodes reachable from `entry` following every edge and branch
    pub fn reachable_from(&self, entry: &str) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([entry.to_string()]);

        while let Some(id) = queue.pop_front() {
            if id == END || !seen.insert(id.clone()) {
                continue;
            }
            for edge in self.edges.get(&id).into_iter().flatten() {
                queue.extend(edge.targets().into_iter().cloned());
            }
        }

        seen
    }
}
