//! CompiledGraph execution engine for durable workflow threads
//!
//! Once a [`StateGraph`](crate::StateGraph) is compiled it becomes a
//! [`CompiledGraph`]: an immutable topology plus a checkpoint store. Each
//! thread is driven one node at a time, and every step is appended to the
//! thread's log before the next one starts, so a thread can stop at any
//! boundary (interrupt, failure, crash) and be picked up later from its
//! latest checkpoint.
//!
//! # Key Types
//!
//! - [`CompiledGraph`] - The executable graph runtime
//! - [`RunOutcome`] - Completed state or interrupt marker
//! - [`StateSnapshot`] - One checkpoint as seen by callers
//! - [`ThreadStatus`] / [`RunPhase`] - Where a thread stands
//!
//! # Execution Modes
//!
//! - [`invoke`](CompiledGraph::invoke) runs until completion or pause
//! - [`stream`](CompiledGraph::stream) yields one snapshot per step
//! - [`resume`](CompiledGraph::resume) continues past an interrupt point
//! - [`spawn`](CompiledGraph::spawn) runs `invoke` on its own task

mod types;
mod graph;
mod runner;
mod execution;
mod state;
mod streaming;

pub use graph::CompiledGraph;
pub use types::{RunOutcome, RunPhase, StateSnapshot, StateSnapshotStream, ThreadStatus};
