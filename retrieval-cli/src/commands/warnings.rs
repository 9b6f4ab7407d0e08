//! Input warning commands

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use retrieval_core::domain::warning::InputWarning;
use retrieval_core::warnings::InputWarningsList;

use crate::config::CliConfig;

/// Warning subcommands
#[derive(Subcommand)]
pub enum WarningCommands {
    /// List all unresolved input warnings
    List,
    /// Remove warnings, e.g. after fixing inputs by hand
    Clear {
        /// Only clear the warnings of this sensor
        #[arg(long)]
        sensor: Option<String>,
    },
}

pub fn handle_warning_command(command: WarningCommands, config: &CliConfig) -> Result<()> {
    let run_config = config.load()?;
    let list = InputWarningsList::in_logs_root(&run_config.retrieval.general.logs_root);

    match command {
        WarningCommands::List => list_warnings(&list),
        WarningCommands::Clear { sensor } => clear_warnings(&list, sensor.as_deref()),
    }
}

fn list_warnings(list: &InputWarningsList) -> Result<()> {
    let mut warnings = list.list()?;
    if warnings.is_empty() {
        println!("{}", "No unresolved input warnings.".green());
        return Ok(());
    }

    warnings.sort_by(|a, b| {
        a.sensor_id
            .cmp(&b.sensor_id)
            .then(b.from_datetime.cmp(&a.from_datetime))
    });
    println!(
        "{}",
        format!("{} unresolved input warning(s):", warnings.len()).bold()
    );
    println!();
    for warning in &warnings {
        print_warning(warning);
    }
    Ok(())
}

fn print_warning(warning: &InputWarning) {
    println!(
        "  {} {} {}",
        "▸".yellow(),
        warning.sensor_id.bold(),
        warning.from_datetime.format("%Y-%m-%d %H:%M:%S")
    );
    println!("    {}", warning.message);
    println!(
        "    Last checked: {}",
        warning
            .last_checked
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn clear_warnings(list: &InputWarningsList, sensor: Option<&str>) -> Result<()> {
    let removed = list.clear(sensor)?;
    let scope = match sensor {
        Some(id) => format!(" of sensor {}", id),
        None => String::new(),
    };
    println!(
        "{}",
        format!("✓ Cleared {} warning(s){}", removed, scope).green()
    );
    Ok(())
}
