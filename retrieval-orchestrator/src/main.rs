//! Retrieval Orchestrator
//!
//! Generates the retrieval queue and works through it with a bounded number
//! of worker processes. Exits with 0 after the queue is done or after a
//! graceful shutdown, non-zero if the run could not start.

use anyhow::{Context, Result};
use clap::Parser;
use retrieval_core::config::Config;
use retrieval_core::status::RetrievalStatusList;
use retrieval_metadata::load_metadata;
use retrieval_orchestrator::lock::acquire_run_lock;
use retrieval_orchestrator::supervisor::{ProcessLauncher, shutdown_signal};
use retrieval_orchestrator::{ContainerFactory, JobQueue, RunContext, RunOutcome, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "retrieval-orchestrator")]
#[command(about = "Run all pending retrievals", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "RETRIEVAL_CONFIG", default_value = "config/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    config.validate()?;
    let general = config.retrieval.general.clone();

    let log_path = retrieval_orchestrator::logging::init(&general.logs_root)?;
    info!("Starting the automation with PID {}", std::process::id());
    info!("Logging to {}", log_path.display());

    let _run_lock = acquire_run_lock(&general.containers_root)
        .context("Another retrieval run is already active")?;
    let shutdown = shutdown_signal().context("Failed to install signal handlers")?;
    tokio::pin!(shutdown);
    info!("Established graceful teardown hook");

    let status = RetrievalStatusList::in_logs_root(&general.logs_root);
    status
        .reset()
        .context("Failed to reset retrieval status list")?;

    let setup = async {
        let factory = ContainerFactory::new(&general, &config.algorithms())
            .await
            .context("Failed to set up container factory")?;
        factory
            .remove_all_containers(true)
            .context("Failed to remove leftover containers")?;

        let metadata = load_metadata(&config.general.metadata)
            .await
            .context("Failed to load metadata")?;

        let worker = match &general.worker_executable {
            Some(path) => path.clone(),
            None => ProcessLauncher::default_worker_executable()?,
        };
        info!("Workers run {}", worker.display());

        let ctx = RunContext::new(config, &cli.config, Arc::new(metadata));
        let queue = JobQueue::generate(&ctx)?;
        status
            .add_jobs(queue.iter())
            .context("Failed to record retrieval status")?;

        let launcher = ProcessLauncher::new(worker, &cli.config);
        Ok::<_, anyhow::Error>(Supervisor::new(
            ctx,
            Arc::new(factory),
            Box::new(launcher),
            queue,
        ))
    };

    let supervisor = tokio::select! {
        biased;
        _ = &mut shutdown => {
            info!("Automation was stopped by signal before processing started");
            if let Err(e) = status.reset() {
                error!("Failed to reset retrieval status list: {}", e);
            }
            return Ok(());
        }
        supervisor = setup => supervisor?,
    };

    match supervisor.run_until(shutdown).await? {
        RunOutcome::Completed => info!("Automation is finished"),
        RunOutcome::Interrupted => info!("Automation was stopped"),
    }
    Ok(())
}
