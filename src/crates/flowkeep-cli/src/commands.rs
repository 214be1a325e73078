//! Command handlers for the flowkeep binary
//!
//! Each handler returns the text it would print so the binary stays a thin
//! dispatch layer and the output can be checked in tests.

use colored::Colorize;
use flowkeep_checkpoint::{CheckpointSaver, SqliteCheckpointSaver, StepStatus};
use flowkeep_core::{CompiledGraph, RunOutcome, RunPhase, StateSnapshot, ThreadStatus};
use futures::StreamExt;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

use crate::catalog::MemoryCatalog;
use crate::config::FlowkeepConfig;
use crate::error::{CliError, Result};
use crate::pipeline::{self, DraftingWorkflow};

/// How command output is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Open the checkpoint database and compile the drafting workflow against it
pub async fn open_engine(config: &FlowkeepConfig) -> Result<CompiledGraph> {
    let saver = SqliteCheckpointSaver::connect(config.database_path()).await?;
    saver.setup().await?;

    let catalog = Arc::new(MemoryCatalog::from_sources(&config.sources)?);
    let graph = DraftingWorkflow::from_config(&config.workflow, catalog)
        .compile()?
        .with_checkpointer(Arc::new(saver));

    info!(database = %config.database.path, "Drafting workflow ready");
    Ok(graph)
}

/// Start (or continue) a thread
pub async fn handle_run(
    graph: &CompiledGraph,
    thread_id: &str,
    topic: &str,
    url: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let outcome = graph
        .invoke(thread_id, pipeline::initial_state(topic, url))
        .await?;
    render_outcome(thread_id, &outcome, format)
}

/// Record a review decision and continue the thread
pub async fn handle_resume(
    graph: &CompiledGraph,
    thread_id: &str,
    approved: bool,
    feedback: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let outcome = graph
        .resume(
            thread_id,
            pipeline::review_decision(approved, feedback),
            pipeline::REVIEW,
        )
        .await?;
    render_outcome(thread_id, &outcome, format)
}

pub async fn handle_status(
    graph: &CompiledGraph,
    thread_id: &str,
    format: OutputFormat,
) -> Result<String> {
    let status = graph
        .get_status(thread_id)
        .await?
        .ok_or_else(|| unknown_thread(thread_id))?;
    render_status(&status, format)
}

pub async fn handle_history(
    graph: &CompiledGraph,
    thread_id: &str,
    format: OutputFormat,
) -> Result<String> {
    let mut stream = graph.get_state_history(thread_id).await?;
    let mut snapshots = Vec::new();
    while let Some(snapshot) = stream.next().await {
        snapshots.push(snapshot?);
    }
    if snapshots.is_empty() {
        return Err(unknown_thread(thread_id));
    }
    render_history(&snapshots, format)
}

fn unknown_thread(thread_id: &str) -> CliError {
    CliError::UnknownThread(thread_id.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::Output(e.to_string()))
}

pub fn render_outcome(thread_id: &str, outcome: &RunOutcome, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return to_json(outcome);
    }

    let mut out = String::new();
    match outcome {
        RunOutcome::Completed(state) => {
            writeln!(out, "{} Thread '{}' completed", "✓".green().bold(), thread_id)?;
            write_post(&mut out, state)?;
        }
        RunOutcome::Interrupted(marker) => {
            writeln!(
                out,
                "{} Thread '{}' waiting at '{}' (step {})",
                "⏸".yellow().bold(),
                thread_id,
                marker.pending_node,
                marker.step_index
            )?;
            write_post(&mut out, &marker.state)?;
            writeln!(
                out,
                "\nApprove with `flowkeep resume --thread {} --approve`",
                thread_id
            )?;
        }
    }
    Ok(out)
}

fn write_post(out: &mut String, state: &flowkeep_core::WorkflowState) -> std::fmt::Result {
    if let Some(heading) = state.get_str("post_heading") {
        writeln!(out, "\n{}", heading.bold())?;
    }
    if let Some(content) = state.get_str("post_content") {
        writeln!(out, "{}", content)?;
    }
    if let Some(count) = state.get_i64("iteration_count") {
        writeln!(out, "\nDraft iterations: {}", count)?;
    }
    Ok(())
}

pub fn render_status(status: &ThreadStatus, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return to_json(status);
    }

    let name = status.phase.to_string();
    let phase = match status.phase {
        RunPhase::Completed => name.as_str().green(),
        RunPhase::Interrupted => name.as_str().yellow(),
        RunPhase::Failed => name.as_str().red(),
        RunPhase::Running => name.as_str().normal(),
    };

    let mut out = String::new();
    writeln!(out, "Thread: {}", status.thread_id)?;
    writeln!(out, "Phase:  {}", phase)?;
    writeln!(out, "Step:   {}", status.step_index)?;
    if let Some(node) = &status.pending_node {
        writeln!(out, "Next:   {}", node)?;
    }
    if let Some(error) = &status.error {
        writeln!(out, "Error:  {}", error)?;
    }
    Ok(out)
}

pub fn render_history(snapshots: &[StateSnapshot], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return to_json(&snapshots);
    }

    let mut out = String::new();
    writeln!(out, "{:<6} {:<12} {:<8} {:<12} {:<12}", "Step", "Node", "Source", "Status", "Next")?;
    writeln!(out, "{}", "-".repeat(54))?;
    for snapshot in snapshots {
        let status = match snapshot.status {
            StepStatus::Completed => snapshot.status.as_str().normal(),
            StepStatus::Failed => snapshot.status.as_str().red(),
        };
        writeln!(
            out,
            "{:<6} {:<12} {:<8} {:<12} {:<12}",
            snapshot.step_index,
            snapshot.node.as_deref().unwrap_or("-"),
            snapshot.source.to_string(),
            status,
            snapshot.next.to_string()
        )?;
        if let Some(error) = &snapshot.error {
            writeln!(out, "       {}", error.red())?;
        }
    }
    Ok(out)
}
