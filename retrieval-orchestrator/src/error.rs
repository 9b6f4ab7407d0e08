//! Error types of the container factory

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while provisioning or removing containers
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The label was never issued or has already been removed
    #[error("no container with label \"{0}\"")]
    UnknownContainer(String),

    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Preparing a retrieval program failed
    #[error("setup of {algorithm} failed: {reason}")]
    Setup { algorithm: String, reason: String },
}

impl ContainerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn setup(algorithm: impl ToString, reason: impl Into<String>) -> Self {
        Self::Setup {
            algorithm: algorithm.to_string(),
            reason: reason.into(),
        }
    }
}
