use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(version, about = "Review gate for agent-completed tasks")]
pub struct Cli {
    /// Debug logging for gatekeeper (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Review a task with the configured reviewer agent
    Review {
        task_id: String,

        /// Log escalations instead of sending desktop notifications
        #[arg(long)]
        quiet: bool,
    },
    /// Print the prompt a review of the task would send
    Context { task_id: String },
    /// Parse reviewer output (stdin or file) and print the verdict as JSON
    Parse {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Skip structured JSON verdicts and use keyword heuristics only
        #[arg(long)]
        keywords_only: bool,
    },
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
    Init,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("gatekeeper=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gatekeeper=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Review { task_id, quiet } => cmd::cmd_review(&project_dir, task_id, *quiet).await?,
        Commands::Context { task_id } => cmd::cmd_context(&project_dir, task_id).await?,
        Commands::Parse {
            file,
            keywords_only,
        } => cmd::cmd_parse(file.as_deref(), *keywords_only)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
