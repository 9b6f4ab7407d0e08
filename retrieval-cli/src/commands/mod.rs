//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod containers;
mod queue;
mod status;
mod warnings;

pub use containers::ContainerCommands;
pub use warnings::WarningCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::CliConfig;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the jobs the next run would process, without running them
    Queue,
    /// Show the progress of the jobs of the current run
    Status,
    /// Unresolved input warnings
    Warnings {
        #[command(subcommand)]
        command: WarningCommands,
    },
    /// Retrieval containers
    Containers {
        #[command(subcommand)]
        command: ContainerCommands,
    },
}

/// Routes the command to its handler module
pub async fn handle_command(command: Commands, config: &CliConfig) -> Result<()> {
    match command {
        Commands::Queue => queue::show_queue(config).await,
        Commands::Status => status::show_status(config),
        Commands::Warnings { command } => warnings::handle_warning_command(command, config),
        Commands::Containers { command } => containers::handle_container_command(command, config),
    }
}
