//! Container commands

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use retrieval_orchestrator::ContainerFactory;
use retrieval_orchestrator::lock::acquire_run_lock;

use crate::config::CliConfig;

/// Container subcommands
#[derive(Subcommand)]
pub enum ContainerCommands {
    /// Remove every container directory left behind by earlier runs
    Clean,
}

pub fn handle_container_command(command: ContainerCommands, config: &CliConfig) -> Result<()> {
    match command {
        ContainerCommands::Clean => clean_containers(config),
    }
}

fn clean_containers(config: &CliConfig) -> Result<()> {
    let run_config = config.load()?;
    let general = &run_config.retrieval.general;

    let _run_lock = acquire_run_lock(&general.containers_root)
        .context("A retrieval run is active, refusing to remove its containers")?;
    let factory = ContainerFactory::without_setup(&general.containers_root, &general.algorithms_root);
    let removed = factory.remove_all_containers(true)?;

    if removed == 0 {
        println!("{}", "No containers to remove.".yellow());
    } else {
        println!(
            "{}",
            format!("✓ Removed {} container directories", removed).green()
        );
    }
    Ok(())
}
