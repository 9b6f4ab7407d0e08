//! Retrieval status of the current run

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use colored::*;
use retrieval_core::domain::status::{JobState, RetrievalStatus};
use retrieval_core::status::RetrievalStatusList;

use crate::config::CliConfig;

/// Prints the progress of every job of the current (or last) run
pub fn show_status(config: &CliConfig) -> Result<()> {
    let run_config = config.load()?;
    let list = RetrievalStatusList::in_logs_root(&run_config.retrieval.general.logs_root);
    let items = list.list()?;

    if items.is_empty() {
        println!("{}", "No jobs in the retrieval status list.".yellow());
        return Ok(());
    }

    let count = |state| items.iter().filter(|s| s.state() == state).count();
    let (pending, running, done) = (
        count(JobState::Pending),
        count(JobState::Running),
        count(JobState::Done),
    );
    if done == items.len() {
        println!("{}", format!("All {} job(s) done", done).green().bold());
    } else {
        println!(
            "{}",
            format!("{} pending, {} running, {} done", pending, running, done).bold()
        );
    }
    println!();

    for item in &items {
        print_status(item);
    }
    Ok(())
}

fn print_status(item: &RetrievalStatus) {
    let state = match item.state() {
        JobState::Pending => item.state().as_str().dimmed(),
        JobState::Running => item.state().as_str().cyan(),
        JobState::Done => item.state().as_str().green(),
    };
    let elapsed = match (item.process_start_time, item.process_end_time) {
        (Some(start), Some(end)) => format_elapsed(end - start),
        (Some(start), None) => format_elapsed(Utc::now() - start),
        _ => String::new(),
    };
    let suffix = item
        .output_suffix
        .as_deref()
        .map(|s| format!(" ({})", s))
        .unwrap_or_default();

    println!(
        "  {:<8} {}  {}{}  {}  {}/{}  {}  {}  {}",
        state,
        item.sensor_id.bold(),
        item.from_datetime.format("%Y-%m-%d %H:%M"),
        suffix,
        item.location_id.dimmed(),
        item.retrieval_algorithm,
        item.atmospheric_profile_model,
        item.container_id.as_deref().unwrap_or("-"),
        item.ifg_count
            .map(|n| format!("{} ifg(s)", n))
            .unwrap_or_default(),
        elapsed.dimmed()
    );
}

/// Renders a duration as e.g. `1d 2h 5m`, dropping leading zero units
fn format_elapsed(elapsed: TimeDelta) -> String {
    let total_minutes = elapsed.num_minutes().max(0);
    let (days, hours, minutes) = (
        total_minutes / (24 * 60),
        total_minutes / 60 % 24,
        total_minutes % 60,
    );
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(TimeDelta::seconds(59)), "0m");
        assert_eq!(format_elapsed(TimeDelta::minutes(61)), "1h 1m");
        assert_eq!(format_elapsed(TimeDelta::minutes(24 * 60 + 5)), "1d 0h 5m");
        assert_eq!(format_elapsed(TimeDelta::minutes(-3)), "0m");
    }
}
