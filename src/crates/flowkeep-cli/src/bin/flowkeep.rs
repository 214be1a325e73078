//! flowkeep CLI - run and review durable drafting threads
//!
//! Main entry point for the flowkeep command-line tool.

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use flowkeep::{commands, init_logging, load_config, OutputFormat};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flowkeep")]
#[command(about = "flowkeep - durable, resumable drafting workflows", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = flowkeep::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Checkpoint database, overriding `database.path`
    #[arg(long, global = true, env = "FLOWKEEP_DATABASE")]
    database: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a drafting thread, or continue one that stopped early
    Run {
        /// Thread ID
        #[arg(short, long)]
        thread: String,
        /// Topic of the post
        #[arg(long)]
        topic: String,
        /// Source URL to summarize
        #[arg(long)]
        url: Option<String>,
    },

    /// Record a review decision for a paused thread
    #[command(group(ArgGroup::new("decision").required(true).args(["approve", "reject"])))]
    Resume {
        /// Thread ID
        #[arg(short, long)]
        thread: String,
        /// Accept the draft
        #[arg(long)]
        approve: bool,
        /// Send the draft back for revision
        #[arg(long, requires = "feedback")]
        reject: bool,
        /// What the revision should address
        #[arg(long)]
        feedback: Option<String>,
    },

    /// Show where a thread stands
    Status {
        /// Thread ID
        #[arg(short, long)]
        thread: String,
    },

    /// List every checkpoint of a thread
    History {
        /// Thread ID
        #[arg(short, long)]
        thread: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .await
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    init_logging(&config.logging);

    let graph = commands::open_engine(&config)
        .await
        .with_context(|| format!("opening {}", config.database.path))?;

    let output = match cli.command {
        Commands::Run { thread, topic, url } => {
            commands::handle_run(&graph, &thread, &topic, url.as_deref(), cli.format)
                .await
                .with_context(|| format!("running thread '{}'", thread))?
        }
        Commands::Resume {
            thread,
            approve,
            feedback,
            ..
        } => commands::handle_resume(&graph, &thread, approve, feedback.as_deref(), cli.format)
            .await
            .with_context(|| format!("resuming thread '{}'", thread))?,
        Commands::Status { thread } => commands::handle_status(&graph, &thread, cli.format).await?,
        Commands::History { thread } => {
            commands::handle_history(&graph, &thread, cli.format).await?
        }
    };

    print!("{}", output);
    Ok(())
}
