//! Retrieval CLI
//!
//! Operator commands around the retrieval orchestrator: previewing the
//! queue, managing input warnings and sweeping leftover containers.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::CliConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retrieval")]
#[command(about = "Retrieval pipeline operator CLI", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "RETRIEVAL_CONFIG", default_value = "config/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig {
        config_path: cli.config,
    };

    handle_command(cli.command, &config).await
}
