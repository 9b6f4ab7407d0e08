//! Container domain types
//!
//! A container is an isolated directory tree in which exactly one job runs:
//! a copy of the retrieval program, an input staging directory and an empty
//! output directory, all addressed by one label.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::job::RetrievalAlgorithm;

/// Prefix shared by every directory a container owns
pub const CONTAINER_PREFIX: &str = "retrieval-container-";

/// Input staging subdirectories created in every container
pub const INPUT_SUBDIRS: [&str; 3] = ["ifg", "map", "log"];

/// Directory locations of one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPaths {
    pub label: String,
    pub containers_root: PathBuf,
}

impl ContainerPaths {
    fn dir(&self, suffix: &str) -> PathBuf {
        self.containers_root
            .join(format!("{}{}{}", CONTAINER_PREFIX, self.label, suffix))
    }
}

/// An isolated execution directory for one job
///
/// The variants share the same directory capabilities and differ only in
/// whether the program expects a rendered config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Container {
    /// Proffast 1.0: the program reads the serialized session
    Proffast1(ContainerPaths),
    /// Proffast 2.x: the program reads a rendered `pylot_config.yml`
    Proffast2(ContainerPaths),
}

impl Container {
    /// Creates the container description for an algorithm
    ///
    /// This only computes paths, the directories are created by the factory.
    pub fn new(algorithm: RetrievalAlgorithm, label: String, containers_root: &Path) -> Self {
        let paths = ContainerPaths {
            label,
            containers_root: containers_root.to_path_buf(),
        };
        if algorithm.uses_pylot_config() {
            Container::Proffast2(paths)
        } else {
            Container::Proffast1(paths)
        }
    }

    fn paths(&self) -> &ContainerPaths {
        match self {
            Container::Proffast1(paths) | Container::Proffast2(paths) => paths,
        }
    }

    pub fn label(&self) -> &str {
        &self.paths().label
    }

    /// Directory holding the copy of the retrieval program
    pub fn container_path(&self) -> PathBuf {
        self.paths().dir("")
    }

    /// Directory holding staged inputs
    pub fn input_path(&self) -> PathBuf {
        self.paths().dir("-inputs")
    }

    /// Directory the program writes its outputs into
    pub fn output_path(&self) -> PathBuf {
        self.paths().dir("-outputs")
    }

    /// Rendered program configuration, if this variant uses one
    pub fn config_path(&self) -> Option<PathBuf> {
        match self {
            Container::Proffast1(_) => None,
            Container::Proffast2(_) => Some(self.input_path().join("pylot_config.yml")),
        }
    }

    /// Rendered log format description, if this variant uses one
    pub fn log_format_path(&self) -> Option<PathBuf> {
        match self {
            Container::Proffast1(_) => None,
            Container::Proffast2(_) => Some(self.input_path().join("pylot_log_format.yml")),
        }
    }

    /// Serialized session handed to the worker process
    pub fn session_path(&self) -> PathBuf {
        self.input_path().join("session.json")
    }

    /// Log file written by the worker process
    pub fn log_path(&self) -> PathBuf {
        self.input_path().join("container.log")
    }

    /// Every directory this container owns
    pub fn directories(&self) -> [PathBuf; 3] {
        [self.container_path(), self.input_path(), self.output_path()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_label() {
        let root = Path::new("/data/containers");
        let container = Container::new(RetrievalAlgorithm::Proffast24, "ab12-cd34".into(), root);
        assert_eq!(
            container.container_path(),
            root.join("retrieval-container-ab12-cd34")
        );
        assert_eq!(
            container.input_path(),
            root.join("retrieval-container-ab12-cd34-inputs")
        );
        assert_eq!(
            container.output_path(),
            root.join("retrieval-container-ab12-cd34-outputs")
        );
        assert_eq!(
            container.config_path(),
            Some(root.join("retrieval-container-ab12-cd34-inputs/pylot_config.yml"))
        );
    }

    #[test]
    fn test_proffast1_has_no_config() {
        let container = Container::new(
            RetrievalAlgorithm::Proffast10,
            "ab12-cd34".into(),
            Path::new("/tmp"),
        );
        assert!(matches!(container, Container::Proffast1(_)));
        assert!(container.config_path().is_none());
    }
}
