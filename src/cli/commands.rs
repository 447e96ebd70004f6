//! CLI command definitions for copyforge.
//!
//! Two commands: `run` submits one generation job and polls it to a
//! terminal state, `titles` generates four-perspective title candidates
//! for a keyword list.

use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::config::Settings;
use crate::llm::ChatClient;
use crate::pipeline::DraftRequest;
use crate::scheduler::{JobScheduler, JobStatus};

/// Poll interval while waiting for a job to finish.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Retrieval-backed copy generation pipeline.
#[derive(Parser)]
#[command(name = "copyforge")]
#[command(about = "Generate two-flow marketing copy backed by corpus retrieval")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Submit one generation job and wait for its artifacts.
    Run(RunArgs),

    /// Generate four-perspective title candidates from keywords.
    Titles(TitlesArgs),
}

/// Arguments for `copyforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Title to write copy for.
    #[arg(short, long)]
    pub title: String,

    /// Free-form description of the intent.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Requested voice; matching tone candidates are preferred.
    #[arg(short, long)]
    pub voice: Option<String>,
}

/// Arguments for `copyforge titles`.
#[derive(Parser, Debug)]
pub struct TitlesArgs {
    /// Comma-separated keywords to build titles from.
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub keywords: Vec<String>,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the CLI with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_job(args).await,
        Commands::Titles(args) => run_titles(args).await,
    }
}

/// Submits one job and polls it until it reaches a terminal state.
async fn run_job(args: RunArgs) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let scheduler = JobScheduler::from_settings(&settings);

    let mut request = DraftRequest::new(args.title);
    if let Some(description) = args.description {
        request = request.with_description(description);
    }
    if let Some(voice) = args.voice {
        request = request.with_voice(voice);
    }

    let job_id = scheduler.submit(request).await;
    info!(job_id = %job_id, "Job submitted");

    let view = loop {
        let view = scheduler.status(job_id).await?;
        info!(
            job_id = %job_id,
            status = %view.status,
            stage = %view.stage,
            progress = view.progress,
            "Polling"
        );
        if view.status.is_terminal() {
            break view;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    if view.status == JobStatus::Error {
        anyhow::bail!(
            "Job {} failed: {}",
            job_id,
            view.message.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let result = scheduler.result(job_id).await?;
    println!("=== 文案 A ===\n{}\n", result.final_a);
    println!("=== 文案 B ===\n{}\n", result.final_b);
    println!("Artifacts: {}", scheduler.job_output_dir(job_id).display());
    Ok(())
}

/// Generates title candidates and prints them as pretty JSON.
async fn run_titles(args: TitlesArgs) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let client = ChatClient::from_settings(&settings);

    let titles = client.generate_titles(&args.keywords).await?;
    println!("{}", serde_json::to_string_pretty(&titles)?);
    Ok(())
}
