//! Retrieval Runner
//!
//! Processes exactly one session and exits. Spawned by the orchestrator as
//! `retrieval-runner --config <config.toml> --session <session.json>`.
//!
//! Steps:
//! - Staging: copy profiles and pressure data, link interferograms, fill in
//!   the program's input templates
//! - Execution: run the retrieval program inside the container
//! - Publication: classify the output and move it into the results tree
//!
//! Missing inputs are recorded in the input warnings list instead of
//! producing an output. Whatever the program does, a staged session always
//! ends with exactly one published output directory.

mod execution;
mod logging;
mod outputs;
mod permissions;
mod signals;
mod staging;
mod templates;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use retrieval_core::config::Config;
use retrieval_core::domain::session::Session;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::signals::Teardown;
use crate::worker::{Worker, WorkerOutcome};

#[derive(Parser)]
#[command(name = "retrieval-runner")]
#[command(about = "Process one retrieval session", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "RETRIEVAL_CONFIG", default_value = "config/config.toml")]
    config: PathBuf,

    /// Serialized session, written by the orchestrator
    #[arg(long)]
    session: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let session = load_session(&cli.session)?;

    logging::init(&session.container.log_path())?;
    info!("Starting {} with PID {}", session.name(), std::process::id());

    let teardown = Teardown::install().context("Failed to install signal handlers")?;
    let worker = Worker::new(config, session, teardown);

    match worker.run().await {
        Ok(WorkerOutcome::InputsIncomplete) => {
            info!("Inputs are incomplete, nothing was published");
            Ok(())
        }
        Ok(WorkerOutcome::Published { outcome, path }) => {
            info!("Finished as {}: {}", outcome.dir_name(), path.display());
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}

fn load_session(path: &Path) -> Result<Session> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse session {}", path.display()))
}
