//! End-to-end behaviour of compiled graphs over a checkpoint store

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use flowkeep_checkpoint::{
    Checkpoint, CheckpointError, CheckpointSaver, CheckpointSource, CheckpointStream,
    InMemoryCheckpointSaver, NextStep,
};
use flowkeep_core::routing::{EscalationRouter, FreshnessRouter};
use flowkeep_core::{
    handler_fn, CompiledGraph, GraphError, LabeledRouter, MergePolicy, NodeHandler, RunPhase,
    StateGraph, StateUpdate, WorkflowState, END, START,
};
use futures::StreamExt;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Handler that writes one fixed field
fn set(key: &'static str, value: Value) -> Arc<dyn NodeHandler> {
    Arc::new(handler_fn(move |_state| {
        let value = value.clone();
        Box::pin(async move { Ok(StateUpdate::new().with(key, value)) })
    }))
}

async fn history_steps(saver: &dyn CheckpointSaver, thread: &str) -> Vec<Checkpoint> {
    saver
        .history(thread)
        .await
        .unwrap()
        .map(|c| c.unwrap())
        .collect()
        .await
}

/// Store that fails a single append at a chosen step, once
struct FlakySaver {
    inner: InMemoryCheckpointSaver,
    fail_at: u64,
    tripped: AtomicBool,
}

impl FlakySaver {
    fn new(fail_at: u64) -> Self {
        Self {
            inner: InMemoryCheckpointSaver::new(),
            fail_at,
            tripped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CheckpointSaver for FlakySaver {
    async fn append(&self, checkpoint: &Checkpoint) -> flowkeep_checkpoint::Result<()> {
        if checkpoint.step_index == self.fail_at && !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(CheckpointError::Storage("disk full".to_string()));
        }
        self.inner.append(checkpoint).await
    }

    async fn latest(&self, thread_id: &str) -> flowkeep_checkpoint::Result<Option<Checkpoint>> {
        self.inner.latest(thread_id).await
    }

    async fn history(&self, thread_id: &str) -> flowkeep_checkpoint::Result<CheckpointStream> {
        self.inner.history(thread_id).await
    }

    async fn thread_ids(&self) -> flowkeep_checkpoint::Result<Vec<String>> {
        self.inner.thread_ids().await
    }

    async fn delete_thread(&self, thread_id: &str) -> flowkeep_checkpoint::Result<()> {
        self.inner.delete_thread(thread_id).await
    }
}

#[tokio::test]
async fn test_unmapped_label_stops_before_either_branch() {
    let ran = Arc::new(AtomicUsize::new(0));
    let (c_ran, d_ran) = (ran.clone(), ran.clone());

    let mut graph = StateGraph::new();
    graph.add_handler("A", set("a", json!(1)));
    graph.add_handler("B", set("b", json!(1)));
    graph.add_node("C", move |_| {
        let ran = c_ran.clone();
        Box::pin(async move {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(StateUpdate::new())
        })
    });
    graph.add_node("D", move |_| {
        let ran = d_ran.clone();
        Box::pin(async move {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(StateUpdate::new())
        })
    });
    graph.add_edge(START, "A").add_edge("A", "B");
    graph.add_conditional_edge(
        "B",
        |_: &WorkflowState| "z".to_string(),
        HashMap::from([("x", "C"), ("y", "D")]),
    );
    graph.add_edge("C", END).add_edge("D", END);

    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let compiled = graph.compile().unwrap().with_checkpointer(saver.clone());

    let err = compiled.invoke("t", WorkflowState::new()).await.unwrap_err();
    match err {
        GraphError::Routing { thread_id, step_index, node, label } => {
            assert_eq!(thread_id, "t");
            assert_eq!(step_index, 2);
            assert_eq!(node, "B");
            assert_eq!(label, "z");
        }
        other => panic!("expected routing error, got {other}"),
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    let latest = saver.latest("t").await.unwrap().unwrap();
    assert_eq!(latest.step_index, 1);
    assert_eq!(latest.metadata.node.as_deref(), Some("A"));
    assert_eq!(latest.next, NextStep::node("B"));
    assert!(!latest.values.contains_key("b"));
}

#[tokio::test]
async fn test_stream_ends_with_routing_error() {
    let mut graph = StateGraph::new();
    graph.add_handler("A", set("a", json!(1)));
    graph.add_handler("B", set("b", json!(1)));
    graph.add_handler("C", set("c", json!(1)));
    graph.add_handler("D", set("d", json!(1)));
    graph.add_edge(START, "A").add_edge("A", "B");
    graph.add_conditional_edge(
        "B",
        |_: &WorkflowState| "z".to_string(),
        HashMap::from([("x", "C"), ("y", "D")]),
    );
    graph.add_edge("C", END).add_edge("D", END);

    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let compiled = graph.compile().unwrap().with_checkpointer(saver.clone());

    let items: Vec<_> = compiled.stream("t", WorkflowState::new()).collect().await;
    assert_eq!(items.len(), 2);

    let first = items[0].as_ref().unwrap();
    assert_eq!(first.step_index, 1);
    assert_eq!(first.node.as_deref(), Some("A"));
    assert_eq!(first.next, NextStep::node("B"));

    match &items[1] {
        Err(GraphError::Routing { step_index, node, label, .. }) => {
            assert_eq!(*step_index, 2);
            assert_eq!(node, "B");
            assert_eq!(label, "z");
        }
        other => panic!("expected routing error, got {other:?}"),
    }

    let latest = saver.latest("t").await.unwrap().unwrap();
    assert_eq!(latest.step_index, 1);
    assert_eq!(latest.id, first.checkpoint_id);
}

#[tokio::test]
async fn test_stored_thread_at_unknown_node_reports_its_position() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    saver
        .append(
            &Checkpoint::new("t", 0, serde_json::Map::new(), NextStep::node("gone"))
                .with_source(CheckpointSource::Input),
        )
        .await
        .unwrap();

    let mut graph = StateGraph::new();
    graph.add_handler("A", set("a", json!(1)));
    graph.add_edge(START, "A").add_edge("A", END);
    let compiled = graph.compile().unwrap().with_checkpointer(saver.clone());

    let err = compiled.invoke("t", WorkflowState::new()).await.unwrap_err();
    assert!(
        matches!(err, GraphError::Topology { ref message, .. } if message.contains("'gone'")),
        "{err}"
    );
    assert_eq!(err.thread_id(), Some("t"));
    assert_eq!(err.step_index(), Some(0));
    assert_eq!(history_steps(saver.as_ref(), "t").await.len(), 1);
}

#[tokio::test]
async fn test_review_interrupt_then_resume() {
    let review_calls = Arc::new(AtomicUsize::new(0));
    let counter = review_calls.clone();

    let mut graph = StateGraph::new();
    graph.add_handler("Draft", set("post_content", json!("Draft")));
    graph.add_node("Review", move |_| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(StateUpdate::new())
        })
    });
    graph.add_edge(START, "Draft").add_edge("Draft", "Review");
    graph.add_conditional_edge(
        "Review",
        LabeledRouter::new(["approved", "rejected"], |state: &WorkflowState| {
            if state.get_bool("approved") == Some(true) {
                "approved".to_string()
            } else {
                "rejected".to_string()
            }
        }),
        HashMap::from([("approved", END), ("rejected", "Draft")]),
    );
    graph.interrupt_before(["Review"]);
    let compiled = graph.compile().unwrap();

    let paused = compiled.invoke("t", WorkflowState::new()).await.unwrap();
    let marker = paused.interrupt().expect("interrupted");
    assert_eq!(marker.pending_node, "Review");
    assert_eq!(marker.thread_id, "t");
    assert_eq!(marker.state.get_str("post_content"), Some("Draft"));
    assert_eq!(review_calls.load(Ordering::SeqCst), 0);

    let done = compiled
        .resume("t", StateUpdate::new().with("approved", json!(true)), "Review")
        .await
        .unwrap();

    assert!(done.is_completed());
    assert_eq!(review_calls.load(Ordering::SeqCst), 0);
    let status = compiled.get_status("t").await.unwrap().unwrap();
    assert_eq!(status.phase, RunPhase::Completed);
    assert!(status.pending_node.is_none());
}

#[tokio::test]
async fn test_storage_failure_keeps_last_durable_step() {
    let b_calls = Arc::new(AtomicUsize::new(0));
    let counter = b_calls.clone();

    let mut graph = StateGraph::new();
    graph.add_handler("A", set("a", json!(1)));
    graph.add_node("B", move |_| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(StateUpdate::new().with("b", json!(1)))
        })
    });
    graph.add_handler("C", set("c", json!(1)));
    graph.add_edge(START, "A").add_edge("A", "B").add_edge("B", "C").add_edge("C", END);

    let saver = Arc::new(FlakySaver::new(2));
    let compiled = graph.compile().unwrap().with_checkpointer(saver.clone());

    let err = compiled.invoke("t", WorkflowState::new()).await.unwrap_err();
    match &err {
        GraphError::Persistence { step_index, source, .. } => {
            assert_eq!(*step_index, 2);
            assert!(matches!(source, CheckpointError::Storage(_)));
        }
        other => panic!("expected persistence error, got {other}"),
    }

    let latest = saver.latest("t").await.unwrap().unwrap();
    assert_eq!(latest.step_index, 1);
    assert_eq!(latest.next, NextStep::node("B"));

    let status = compiled.get_status("t").await.unwrap().unwrap();
    assert_eq!(status.phase, RunPhase::Running);
    assert_eq!(status.pending_node.as_deref(), Some("B"));

    let outcome = compiled.invoke("t", WorkflowState::new()).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(b_calls.load(Ordering::SeqCst), 2);

    let steps: Vec<u64> = history_steps(saver.as_ref(), "t")
        .await
        .iter()
        .map(|c| c.step_index)
        .collect();
    assert_eq!(steps, vec![0, 1, 2, 3]);
}

/// draft → review(interrupt) → publish → END, where publish records the decision
fn review_pipeline() -> StateGraph {
    let mut graph = StateGraph::new();
    graph.add_field("log", MergePolicy::Append);
    graph.add_node("draft", |_| {
        Box::pin(async { Ok(StateUpdate::new().with("log", json!("drafted"))) })
    });
    graph.add_node("review", |_| {
        Box::pin(async {
            Ok(StateUpdate::new()
                .with("approved", json!(true))
                .with("log", json!("reviewed")))
        })
    });
    graph.add_node("publish", |state| {
        Box::pin(async move {
            let approved = state.get_bool("approved").unwrap_or(false);
            Ok(StateUpdate::new().with("log", json!(format!("published:{approved}"))))
        })
    });
    graph
        .add_edge(START, "draft")
        .add_edge("draft", "review")
        .add_edge("review", "publish")
        .add_edge("publish", END);
    graph
}

#[tokio::test]
async fn test_resume_matches_handler_run() {
    let update = StateUpdate::new()
        .with("approved", json!(true))
        .with("log", json!("reviewed"));

    let straight = review_pipeline()
        .compile()
        .unwrap()
        .invoke("t", WorkflowState::new())
        .await
        .unwrap();

    let mut interrupted = review_pipeline();
    interrupted.interrupt_before(["review"]);
    let compiled = interrupted.compile().unwrap();
    compiled.invoke("t", WorkflowState::new()).await.unwrap();
    let resumed = compiled.resume("t", update, "review").await.unwrap();

    assert_eq!(straight.state(), resumed.state());
    assert_eq!(
        resumed.state().get("log"),
        Some(&json!(["drafted", "reviewed", "published:true"]))
    );
}

#[tokio::test]
async fn test_bounded_regenerate_loop_escalates() {
    let mut graph = StateGraph::new();
    graph.add_node("generate", |state| {
        Box::pin(async move {
            let count = state.get_i64("iteration_count").unwrap_or(0);
            Ok(StateUpdate::new().with("iteration_count", json!(count + 1)))
        })
    });
    graph.add_handler("evaluate", set("grade", json!("bad")));
    graph.add_handler("review", set("escalated", json!(true)));
    graph.add_edge(START, "generate").add_edge("generate", "evaluate");
    graph.add_conditional_edge(
        "evaluate",
        EscalationRouter::new(4),
        HashMap::from([
            ("accept", "review"),
            ("regenerate", "generate"),
            ("escalate", "review"),
        ]),
    );
    graph.add_edge("review", END);

    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let compiled = graph.compile().unwrap().with_checkpointer(saver.clone());

    let outcome = compiled.invoke("t", WorkflowState::new()).await.unwrap();
    assert_eq!(outcome.state().get_i64("iteration_count"), Some(4));
    assert_eq!(outcome.state().get_bool("escalated"), Some(true));

    // input + 4 × (generate, evaluate) + review
    let history = history_steps(saver.as_ref(), "t").await;
    assert_eq!(history.len(), 10);
    let generated = history
        .iter()
        .filter(|c| c.metadata.node.as_deref() == Some("generate"))
        .count();
    assert_eq!(generated, 4);
}

#[tokio::test]
async fn test_freshness_routing_in_a_graph() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    let build = || {
        let mut graph = StateGraph::new();
        graph.add_node("lookup", |_| Box::pin(async { Ok(StateUpdate::new()) }));
        graph.add_handler("draft", set("path", json!("cached")));
        graph.add_handler("fetch", set("path", json!("fetched")));
        graph.add_edge(START, "lookup");
        graph.add_conditional_edge(
            "lookup",
            FreshnessRouter::new("fetched_at").with_clock(move || now),
            HashMap::from([("fresh", "draft"), ("stale", "fetch")]),
        );
        graph.add_edge("draft", END).add_edge("fetch", END);
        graph.compile().unwrap()
    };

    let cases = [
        (Some(now - Duration::hours(36)), "cached"),
        (Some(now - Duration::hours(50)), "fetched"),
        (None, "fetched"),
    ];
    for (i, (fetched_at, expected)) in cases.into_iter().enumerate() {
        let mut initial = WorkflowState::new();
        if let Some(ts) = fetched_at {
            initial = initial.with("fetched_at", json!(ts.to_rfc3339()));
        }
        let outcome = build().invoke(&format!("t{i}"), initial).await.unwrap();
        assert_eq!(outcome.state().get_str("path"), Some(expected));
    }
}

fn slow_graph() -> CompiledGraph {
    let mut graph = StateGraph::new();
    graph.add_field("visits", MergePolicy::Append);
    for name in ["one", "two", "three"] {
        graph.add_node(name, move |state| {
            Box::pin(async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                let id = state.get_str("id").unwrap_or_default().to_string();
                Ok(StateUpdate::new().with("visits", json!(format!("{id}:{name}"))))
            })
        });
    }
    graph
        .add_edge(START, "one")
        .add_edge("one", "two")
        .add_edge("two", "three")
        .add_edge("three", END);
    graph.compile().unwrap()
}

#[tokio::test]
async fn test_independent_threads_run_concurrently() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let compiled = slow_graph().with_checkpointer(saver.clone());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let id = format!("thread-{i}");
            compiled.spawn(id.clone(), WorkflowState::new().with("id", json!(id)))
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap().unwrap();
        let id = format!("thread-{i}");
        assert_eq!(
            outcome.state().get("visits"),
            Some(&json!([
                format!("{id}:one"),
                format!("{id}:two"),
                format!("{id}:three")
            ]))
        );
    }

    assert_eq!(saver.thread_count().await, 8);
    for i in 0..8 {
        let steps: Vec<u64> = history_steps(saver.as_ref(), &format!("thread-{i}"))
            .await
            .iter()
            .map(|c| c.step_index)
            .collect();
        assert_eq!(steps, vec![0, 1, 2, 3]);
    }
}

#[tokio::test]
async fn test_two_engines_on_one_store_cannot_interleave() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let first = slow_graph().with_checkpointer(saver.clone());
    let second = slow_graph().with_checkpointer(saver.clone());

    let a = first.spawn("shared", WorkflowState::new().with("id", json!("a")));
    let b = second.spawn("shared", WorkflowState::new().with("id", json!("b")));
    let results = [a.await.unwrap(), b.await.unwrap()];

    // at least one run finishes; any loser is rejected by the store, not merged
    assert!(results.iter().any(|r| r.is_ok()));
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(err, GraphError::Persistence { source, .. } if source.is_conflict()),
                "{err}"
            );
        }
    }

    let steps: Vec<u64> = history_steps(saver.as_ref(), "shared")
        .await
        .iter()
        .map(|c| c.step_index)
        .collect();
    let expected: Vec<u64> = (0..steps.len() as u64).collect();
    assert_eq!(steps, expected);
}

proptest! {
    #[test]
    fn prop_append_merge_concatenates(
        first in proptest::collection::vec(any::<i64>(), 0..6),
        second in proptest::collection::vec(any::<i64>(), 0..6),
    ) {
        let policy = MergePolicy::Append;
        let once = policy.merge(None, &json!(first));
        let twice = policy.merge(Some(&once), &json!(second));

        let mut expected = first.clone();
        expected.extend(second.iter().copied());
        prop_assert_eq!(twice, json!(expected));

        let unchanged = policy.merge(Some(&json!(first)), &json!([]));
        prop_assert_eq!(unchanged, json!(first));
    }

    #[test]
    fn prop_replace_yields_new_value(old in any::<i64>(), new in any::<i64>()) {
        prop_assert_eq!(MergePolicy::Replace.merge(Some(&json!(old)), &json!(new)), json!(new));
    }

    #[test]
    fn prop_checkpoints_contiguous_for_any_chain_length(length in 1usize..12) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async move {
            let mut graph = StateGraph::new();
            for i in 0..length {
                graph.add_node(format!("n{i}"), |_| Box::pin(async { Ok(StateUpdate::new()) }));
            }
            graph.add_edge(START, "n0");
            for i in 1..length {
                graph.add_edge(format!("n{}", i - 1), format!("n{i}"));
            }
            graph.add_edge(format!("n{}", length - 1), END);

            let saver = Arc::new(InMemoryCheckpointSaver::new());
            let compiled = graph.compile().unwrap().with_checkpointer(saver.clone());
            compiled.invoke("t", WorkflowState::new()).await.unwrap();

            let steps: Vec<u64> = history_steps(saver.as_ref(), "t")
                .await
                .iter()
                .map(|c| c.step_index)
                .collect();
            let expected: Vec<u64> = (0..=length as u64).collect();
            assert_eq!(steps, expected);
        });
    }
}
