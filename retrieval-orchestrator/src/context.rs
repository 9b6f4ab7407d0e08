//! Run context
//!
//! Everything one supervisor run needs, passed explicitly to the queue
//! generator, the container factory and the supervisor.

use retrieval_core::config::Config;
use retrieval_metadata::MetadataProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared state of one run
#[derive(Clone)]
pub struct RunContext {
    pub config: Arc<Config>,
    /// Path of the configuration file, handed on to every worker
    pub config_path: PathBuf,
    pub metadata: Arc<dyn MetadataProvider>,
}

impl RunContext {
    pub fn new(config: Config, config_path: &Path, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            config: Arc::new(config),
            config_path: config_path.to_path_buf(),
            metadata,
        }
    }
}
