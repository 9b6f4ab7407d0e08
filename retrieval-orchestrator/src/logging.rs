//! Logging setup
//!
//! Logs go to stderr and, without colors, to one file per run in
//! `{logs_root}/orchestrator/`.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log file of a run started now
pub fn run_log_path(logs_root: &Path) -> PathBuf {
    logs_root
        .join("orchestrator")
        .join(format!("{}.log", Utc::now().format("%Y%m%d-%H-%M-%S")))
}

/// Installs the global subscriber, returning the run's log file path
pub fn init(logs_root: &Path) -> Result<PathBuf> {
    let path = run_log_path(logs_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retrieval_orchestrator=info,retrieval_metadata=info".into()),
        )
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(path)
}
