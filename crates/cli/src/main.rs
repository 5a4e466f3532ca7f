//! Shardrun CLI - Main Entry Point
//!
//! Runs an end-to-end test suite split across parallel shard processes.

use std::path::PathBuf;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{plan, run};
use shardrun_e2e::RunnerConfig;

/// Shardrun - Sharded E2E Test Runner
#[derive(Parser)]
#[command(name = "shardrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (TOML); defaults apply when it does not exist
    #[arg(long, default_value = "shardrun.toml", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch every shard and report merged results
    Run(run::RunArgs),

    /// Show how files would be sharded without launching anything
    Plan(plan::PlanArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            2
        }
    };
    std::process::exit(code);
}

async fn execute(cli: Cli) -> anyhow::Result<i32> {
    let config = RunnerConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::Plan(args) => plan::execute(args, config, cli.format),
    }
}
