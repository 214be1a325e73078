//! # flowkeep-core - Durable, resumable workflow graphs
//!
//! Long-running workflows (draft → critique → regenerate → human review)
//! expressed as a directed graph of named nodes over a shared JSON state.
//! Each **thread** of a graph is driven one node at a time and checkpointed
//! after every step, so it can pause for a human, fail, or outlive the process
//! and still be picked up exactly where it stopped.
//!
//! ## Core Concepts
//!
//! ### 1. StateGraph
//!
//! [`StateGraph`] declares the topology:
//! - **Nodes**: async handlers returning a partial [`StateUpdate`]
//! - **Edges**: direct, or conditional through a [`Router`] and a closed label mapping
//! - **Schema**: per-field [`MergePolicy`] (`Replace` or `Append`)
//! - **Interrupt points**: nodes the engine pauses before
//!
//! `compile()` validates everything up front and returns a [`CompiledGraph`].
//!
//! ### 2. Execution
//!
//! ```text
//! load latest checkpoint ─► pending node is interrupt point? ─yes─► InterruptMarker
//!          ▲                          │ no
//!          │                    run handler ─err─► failed checkpoint, NodeExecution
//!          │                          │ ok
//!          │                merge ─► route ─► append checkpoint
//!          └──────────────────────────┘           │
//!                                            next is END ─► Completed
//! ```
//!
//! ### 3. Routing evaluators
//!
//! [`routing`] ships the freshness, bounded-retry and approval routers the
//! drafting workflows need. Each declares its labels so mapping mistakes are
//! caught by `compile()`.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowkeep_core::routing::ApprovalRouter;
//! use flowkeep_core::{StateGraph, StateUpdate, WorkflowState, END, START};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flowkeep_core::Result<()> {
//! let mut graph = StateGraph::new();
//! graph.add_node("draft", |_state| {
//!     Box::pin(async move { Ok(StateUpdate::new().with("post_content", json!("Draft"))) })
//! });
//! graph.add_node("review", |_state| Box::pin(async move { Ok(StateUpdate::new()) }));
//! graph.add_edge(START, "draft").add_edge("draft", "review");
//! graph.add_conditional_edge(
//!     "review",
//!     ApprovalRouter::new(),
//!     HashMap::from([("approved", END), ("rejected", "draft")]),
//! );
//! graph.interrupt_before(["review"]);
//!
//! let compiled = graph.compile()?;
//!
//! let paused = compiled.invoke("post-1", WorkflowState::new()).await?;
//! assert_eq!(paused.interrupt().map(|m| m.pending_node.as_str()), Some("review"));
//!
//! let done = compiled
//!     .resume("post-1", StateUpdate::new().with("approved", json!(true)), "review")
//!     .await?;
//! assert!(done.is_completed());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod compiled;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod routing;
pub mod state;

pub use builder::StateGraph;
pub use compiled::{
    CompiledGraph, RunOutcome, RunPhase, StateSnapshot, StateSnapshotStream, ThreadStatus,
};
pub use error::{GraphError, Result};
pub use graph::{
    handler_fn, Edge, FnHandler, Graph, HandlerError, HandlerResult, LabeledRouter, NodeHandler,
    NodeId, Router, END, START,
};
pub use interrupt::{InterruptController, InterruptMarker};
pub use routing::{ApprovalRouter, EscalationRouter, FreshnessRouter};
pub use state::{MergePolicy, StateSchema, StateUpdate, WorkflowState};

pub use flowkeep_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
