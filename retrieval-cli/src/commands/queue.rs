//! Queue preview

use anyhow::{Context, Result};
use colored::*;
use retrieval_core::domain::job::RetrievalJob;
use retrieval_metadata::load_metadata;
use retrieval_orchestrator::{JobQueue, RunContext};
use std::sync::Arc;

use crate::config::CliConfig;

/// Generates the queue exactly like the orchestrator would and prints it
pub async fn show_queue(config: &CliConfig) -> Result<()> {
    let run_config = config.load()?;
    let metadata = load_metadata(&run_config.general.metadata)
        .await
        .context("Failed to load metadata")?;
    let ctx = RunContext::new(run_config, &config.config_path, Arc::new(metadata));
    let queue = JobQueue::generate(&ctx)?;

    if queue.is_empty() {
        println!("{}", "Nothing to do, the queue is empty.".yellow());
        return Ok(());
    }

    println!("{}", format!("{} job(s) queued:", queue.len()).bold());
    println!();
    for (position, job) in queue.iter().enumerate() {
        print_job(position + 1, job);
    }
    Ok(())
}

fn print_job(position: usize, job: &RetrievalJob) {
    let ctx = &job.sensor_data_context;
    println!(
        "  {:>4}  {}  {}  {}/{}  {}",
        position.to_string().dimmed(),
        ctx.sensor_id.bold(),
        job.slug().cyan(),
        job.retrieval_algorithm,
        job.atmospheric_profile_model,
        ctx.location.location_id.dimmed()
    );
}
