//! Reference drafting workflow
//!
//! Turns a topic (and optionally a source URL) into a reviewed post:
//!
//! ```text
//! intake → lookup ─fresh─────────────────────┐
//!             └─stale─► fetch → summarize ──► draft → evaluate ─accept/escalate─► [review] ─approved─► END
//!                                               ▲          │                          │
//!                                               └regenerate┘                          │
//!                                               └──────────────────rejected───────────┘
//! ```
//!
//! `review` is an interrupt point: the thread pauses there until a human
//! resumes it with `{approved, human_feedback}`. The automatic
//! draft/evaluate loop is bounded by `max_iterations`; a human rejection
//! resets the counter, so the human loop itself is unbounded.
//!
//! Node work is deterministic: summaries are the leading sentences of the
//! source text and the evaluator checks the draft against fixed rules. The
//! [`SourceCatalog`] is the only collaborator and is injected here.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use flowkeep_core::routing::{ApprovalRouter, Clock, EscalationRouter, FreshnessRouter};
use flowkeep_core::{
    CompiledGraph, HandlerResult, MergePolicy, NodeHandler, StateGraph, StateUpdate,
    WorkflowState, END, START,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::SourceCatalog;
use crate::config::WorkflowConfig;

pub const INTAKE: &str = "intake";
pub const LOOKUP: &str = "lookup";
pub const FETCH: &str = "fetch";
pub const SUMMARIZE: &str = "summarize";
pub const DRAFT: &str = "draft";
pub const EVALUATE: &str = "evaluate";
pub const REVIEW: &str = "review";

/// Longest post the evaluator accepts, in characters
pub const MAX_POST_CHARS: usize = 1200;

const MAX_SUMMARY_CHARS: usize = 280;
const SUMMARY_SENTENCES: usize = 2;

/// Builder for the drafting graph
pub struct DraftingWorkflow {
    catalog: Arc<dyn SourceCatalog>,
    freshness: Duration,
    max_iterations: u32,
    clock: Clock,
}

impl DraftingWorkflow {
    pub fn new(catalog: Arc<dyn SourceCatalog>) -> Self {
        let defaults = WorkflowConfig::default();
        Self {
            catalog,
            freshness: Duration::hours(defaults.freshness_hours),
            max_iterations: defaults.max_iterations,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn from_config(config: &WorkflowConfig, catalog: Arc<dyn SourceCatalog>) -> Self {
        Self::new(catalog)
            .with_freshness(Duration::hours(config.freshness_hours))
            .with_max_iterations(config.max_iterations)
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Clock used both for freshness routing and for stamping new summaries
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn graph(&self) -> StateGraph {
        let mut graph = StateGraph::new();
        graph.add_field("evaluator_feedback", MergePolicy::Append);

        graph.add_node(INTAKE, |state| Box::pin(async move { intake(&state) }));
        graph.add_handler(
            LOOKUP,
            Arc::new(LookupNode {
                catalog: Arc::clone(&self.catalog),
            }),
        );
        graph.add_handler(
            FETCH,
            Arc::new(FetchNode {
                catalog: Arc::clone(&self.catalog),
            }),
        );
        graph.add_handler(
            SUMMARIZE,
            Arc::new(SummarizeNode {
                catalog: Arc::clone(&self.catalog),
                clock: Arc::clone(&self.clock),
            }),
        );
        graph.add_node(DRAFT, |state| Box::pin(async move { draft(&state) }));
        graph.add_node(EVALUATE, |state| Box::pin(async move { evaluate(&state) }));
        graph.add_node(REVIEW, |_state| Box::pin(async move { Ok(StateUpdate::new()) }));

        let clock = Arc::clone(&self.clock);
        graph.add_edge(START, INTAKE).add_edge(INTAKE, LOOKUP);
        graph.add_conditional_edge(
            LOOKUP,
            FreshnessRouter::new("fetched_at")
                .with_threshold(self.freshness)
                .with_clock(move || clock()),
            HashMap::from([("fresh", DRAFT), ("stale", FETCH)]),
        );
        graph.add_edge(FETCH, SUMMARIZE).add_edge(SUMMARIZE, DRAFT);
        graph.add_edge(DRAFT, EVALUATE);
        graph.add_conditional_edge(
            EVALUATE,
            EscalationRouter::new(self.max_iterations),
            HashMap::from([
                ("accept", REVIEW),
                ("regenerate", DRAFT),
                ("escalate", REVIEW),
            ]),
        );
        graph.add_conditional_edge(
            REVIEW,
            ApprovalRouter::new(),
            HashMap::from([("approved", END), ("rejected", DRAFT)]),
        );
        graph.interrupt_before([REVIEW]);
        graph
    }

    pub fn compile(&self) -> flowkeep_core::Result<CompiledGraph> {
        self.graph().compile()
    }
}

/// Initial state for a new drafting thread
pub fn initial_state(topic: &str, url: Option<&str>) -> WorkflowState {
    let mut state = WorkflowState::new().with("topic", json!(topic));
    if let Some(url) = url {
        state = state.with("url", json!(url));
    }
    state
}

/// Update a reviewer supplies when resuming at `review`
pub fn review_decision(approved: bool, feedback: Option<&str>) -> StateUpdate {
    StateUpdate::new()
        .with("approved", json!(approved))
        .with("human_feedback", feedback.map_or(Value::Null, |text| json!(text)))
}

fn intake(state: &WorkflowState) -> HandlerResult {
    let topic = state.get_str("topic").map(str::trim).unwrap_or_default();
    if topic.is_empty() {
        return Err("a topic is required".into());
    }

    let url = state
        .get_str("url")
        .map(str::trim)
        .filter(|url| !url.is_empty());

    Ok(StateUpdate::new()
        .with("topic", json!(topic))
        .with("url", url.map_or(Value::Null, |url| json!(url)))
        .with("iteration_count", json!(0)))
}

struct LookupNode {
    catalog: Arc<dyn SourceCatalog>,
}

#[async_trait]
impl NodeHandler for LookupNode {
    async fn handle(&self, state: &WorkflowState) -> HandlerResult {
        let never = StateUpdate::new().with("fetched_at", json!("NULL"));
        let Some(url) = state.get_str("url") else {
            return Ok(never);
        };

        match self.catalog.lookup(url).await? {
            Some(record) => match (record.summary, record.fetched_at) {
                (Some(summary), Some(fetched_at)) => Ok(StateUpdate::new()
                    .with("summary", json!(summary))
                    .with("fetched_at", json!(fetched_at.to_rfc3339()))),
                _ => Ok(never),
            },
            None => {
                tracing::debug!(url, "Source not in catalog");
                Ok(never)
            }
        }
    }
}

struct FetchNode {
    catalog: Arc<dyn SourceCatalog>,
}

#[async_trait]
impl NodeHandler for FetchNode {
    async fn handle(&self, state: &WorkflowState) -> HandlerResult {
        let content = match state.get_str("url") {
            Some(url) => self.catalog.fetch(url).await?,
            None => {
                tracing::warn!("No source URL; drafting from the topic alone");
                String::new()
            }
        };
        Ok(StateUpdate::new().with("content", json!(content)))
    }
}

struct SummarizeNode {
    catalog: Arc<dyn SourceCatalog>,
    clock: Clock,
}

#[async_trait]
impl NodeHandler for SummarizeNode {
    async fn handle(&self, state: &WorkflowState) -> HandlerResult {
        let topic = state.get_str("topic").unwrap_or_default();
        let content = state.get_str("content").unwrap_or_default();
        let summary = summarize_text(content)
            .unwrap_or_else(|| format!("No source material was found for {}.", topic));

        let now = (self.clock)();
        if let Some(url) = state.get_str("url") {
            self.catalog.record(url, &summary, now).await?;
        }

        Ok(StateUpdate::new()
            .with("summary", json!(summary))
            .with("fetched_at", json!(now.to_rfc3339())))
    }
}

/// Leading sentences of `content`, whitespace collapsed; `None` if blank
pub fn summarize_text(content: &str) -> Option<String> {
    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return None;
    }

    let mut end = normalized.len();
    let mut sentences = 0;
    for (i, ch) in normalized.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            sentences += 1;
            if sentences == SUMMARY_SENTENCES {
                end = i + ch.len_utf8();
                break;
            }
        }
    }

    let summary: String = normalized[..end].chars().take(MAX_SUMMARY_CHARS).collect();
    Some(summary)
}

fn draft(state: &WorkflowState) -> HandlerResult {
    let topic = state.get_str("topic").unwrap_or_default();
    let summary = state.get_str("summary").unwrap_or_default();
    let mut count = state.get_i64("iteration_count").unwrap_or(0);

    let human_feedback = state
        .get_str("human_feedback")
        .filter(|text| !text.trim().is_empty());

    let content = if let Some(note) = human_feedback {
        // a human rejection restarts the evaluator loop count
        count = 0;
        format!("{}: {}\n\nRevised after review: {}", topic, summary, note)
    } else if !state.get_list("evaluator_feedback").is_empty() {
        format!("{}: {}", topic, summary)
    } else {
        summary.to_string()
    };

    Ok(StateUpdate::new()
        .with("post_heading", json!(format!("{}: what you need to know", topic)))
        .with("post_content", json!(content))
        .with("iteration_count", json!(count + 1))
        .with("human_feedback", Value::Null)
        .with("approved", Value::Null))
}

fn evaluate(state: &WorkflowState) -> HandlerResult {
    let topic = state.get_str("topic").unwrap_or_default();
    let content = state.get_str("post_content").unwrap_or_default();

    let mut issues = Vec::new();
    if content.trim().is_empty() {
        issues.push("the post is empty".to_string());
    }
    if !content.to_lowercase().contains(&topic.to_lowercase()) {
        issues.push(format!("mention the topic '{}' explicitly", topic));
    }
    if content.chars().count() > MAX_POST_CHARS {
        issues.push(format!("shorten the post to at most {} characters", MAX_POST_CHARS));
    }

    let grade = if issues.is_empty() { "good" } else { "bad" };
    Ok(StateUpdate::new()
        .with("grade", json!(grade))
        .with("evaluator_feedback", json!(issues)))
}
