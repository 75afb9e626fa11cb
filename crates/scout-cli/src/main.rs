//! Scout - bounded agent execution CLI
//!
//! The `scout` command runs a declarative agent spec through the execution
//! engine.
//!
//! ## Commands
//!
//! - `run`: Execute a session and export its results
//! - `validate`: Fail-fast check of a spec document without running it

mod observers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use scout_core::tools::reddit::{RedditClient, RedditCommentsTool, RedditSearchTool};
use scout_core::{export, AgentSpec, ScoutPlanner, SessionEngine, ToolRegistry};

use observers::{ConsoleObserver, JsonlObserver};

#[derive(Parser)]
#[command(name = "scout")]
#[command(author = "Scout Engineering")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bounded execution engine for audience-scouting agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
    Report,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session from a spec document and export the results
    Run {
        /// Path to the agent spec document (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Path to a JSON document with the user inputs
        #[arg(short, long)]
        inputs: Option<PathBuf>,

        /// Export format for the results
        #[arg(short, long, value_enum, default_value_t = Format::Report)]
        format: Format,

        /// Write the export here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Append every progress event as JSON lines to this file
        #[arg(long)]
        events_out: Option<PathBuf>,

        /// Override the outbound user agent
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Validate a spec document without running it
    Validate {
        /// Path to the agent spec document
        spec: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    scout_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Validate { spec } => validate(&spec),
        Commands::Run {
            spec,
            inputs,
            format,
            output,
            events_out,
            user_agent,
        } => run(spec, inputs, format, output, events_out, user_agent).await,
    }
}

fn validate(path: &PathBuf) -> Result<()> {
    let spec = AgentSpec::load(path)
        .with_context(|| format!("load agent spec {}", path.display()))?;
    println!(
        "{} v{} is valid ({} input(s), tools: {})",
        spec.name,
        spec.version,
        spec.inputs.len(),
        spec.requirements.tool_names.join(", ")
    );
    Ok(())
}

async fn run(
    spec_path: PathBuf,
    inputs_path: Option<PathBuf>,
    format: Format,
    output_path: Option<PathBuf>,
    events_out: Option<PathBuf>,
    user_agent: Option<String>,
) -> Result<()> {
    let spec = AgentSpec::load(&spec_path)
        .with_context(|| format!("load agent spec {}", spec_path.display()))?;

    let inputs: serde_json::Value = match &inputs_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read inputs {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parse inputs {}", path.display()))?
        }
        None => serde_json::json!({}),
    };

    let user_agent = user_agent
        .or_else(|| spec.env.user_agent.clone())
        .unwrap_or_else(|| format!("scout:{}:v{}", spec.name, spec.version));

    let client = Arc::new(RedditClient::new(&user_agent)?);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(RedditSearchTool::new(client.clone())))?;
    registry.register(Arc::new(RedditCommentsTool::new(client)))?;

    let mut engine = SessionEngine::new(spec, &inputs, registry, Arc::new(ScoutPlanner::new()))?;
    engine.subscribe(Arc::new(ConsoleObserver))?;
    if let Some(path) = &events_out {
        let observer = JsonlObserver::create(path)
            .with_context(|| format!("create event log {}", path.display()))?;
        engine.subscribe(Arc::new(observer))?;
    }

    // Ctrl-C cancels between iterations; in-flight calls finish first.
    let token = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested");
            token.cancel();
        }
    });

    let report = engine.run().await;

    let rendered = match format {
        Format::Json => export::to_json(&report.output)?,
        Format::Csv => export::to_csv(&report.output)?,
        Format::Report => export::to_markdown(&report.output),
    };

    match &output_path {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("write export {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => print!("{rendered}"),
    }

    if let Some(error) = report.error {
        return Err(anyhow::Error::new(error).context(format!(
            "session {} ended with status {}",
            report.session.session_id, report.session.status
        )));
    }
    Ok(())
}
