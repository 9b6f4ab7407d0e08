//! CLI configuration

use anyhow::{Context, Result};
use retrieval_core::config::Config;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// The run configuration file shared with the orchestrator
    pub config_path: PathBuf,
}

impl CliConfig {
    /// Loads and validates the run configuration
    pub fn load(&self) -> Result<Config> {
        let config = Config::load(&self.config_path)
            .with_context(|| format!("Failed to load {}", self.config_path.display()))?;
        config.validate()?;
        Ok(config)
    }
}
