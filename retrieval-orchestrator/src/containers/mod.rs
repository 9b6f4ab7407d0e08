//! Container factory
//!
//! Provisions and destroys containers: isolated directory trees holding a
//! copy of the retrieval program, input staging directories and an output
//! directory. Every in-flight job owns exactly one container.
//!
//! Label allocation is the only synchronization point. Copying the master
//! tree happens outside the lock, so concurrent jobs can create containers
//! at the same time.

mod labels;
pub mod setup;

pub use labels::LabelPool;

use retrieval_core::config::RetrievalGeneralConfig;
use retrieval_core::domain::container::{CONTAINER_PREFIX, Container, INPUT_SUBDIRS};
use retrieval_core::domain::job::RetrievalAlgorithm;
use retrieval_core::fsutil::{copy_tree, remove_tree};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ContainerError;

#[derive(Debug, Default)]
struct FactoryState {
    labels: LabelPool,
    containers: HashMap<String, Container>,
}

/// Issues and removes containers
#[derive(Debug)]
pub struct ContainerFactory {
    containers_root: PathBuf,
    algorithms_root: PathBuf,
    state: Mutex<FactoryState>,
}

impl ContainerFactory {
    /// Creates a factory and prepares every given algorithm
    ///
    /// Downloads missing program sources. Any failure here is fatal for the
    /// run.
    pub async fn new(
        general: &RetrievalGeneralConfig,
        algorithms: &BTreeSet<RetrievalAlgorithm>,
    ) -> Result<Self, ContainerError> {
        for algorithm in algorithms {
            info!("Initializing container factory for {}", algorithm);
            setup::ensure_master(&general.algorithms_root, *algorithm).await?;
        }
        let factory = Self::without_setup(&general.containers_root, &general.algorithms_root);
        info!("Container factory is set up");
        Ok(factory)
    }

    /// Creates a factory that assumes every master copy is already present
    pub fn without_setup(containers_root: &Path, algorithms_root: &Path) -> Self {
        Self {
            containers_root: containers_root.to_path_buf(),
            algorithms_root: algorithms_root.to_path_buf(),
            state: Mutex::new(FactoryState::default()),
        }
    }

    pub fn containers_root(&self) -> &Path {
        &self.containers_root
    }

    /// Creates a new container for an algorithm
    pub fn create_container(&self, algorithm: RetrievalAlgorithm) -> Result<Container, ContainerError> {
        let label = self.state.lock().unwrap().labels.allocate();
        let container = Container::new(algorithm, label, &self.containers_root);

        match self.provision(algorithm, &container) {
            Ok(()) => {
                debug!("Created container {}", container.label());
                self.state
                    .lock()
                    .unwrap()
                    .containers
                    .insert(container.label().to_string(), container.clone());
                Ok(container)
            }
            Err(e) => {
                for dir in container.directories() {
                    if let Err(cleanup) = remove_tree(&dir) {
                        warn!("Failed to clean up {}: {}", dir.display(), cleanup);
                    }
                }
                self.state.lock().unwrap().labels.free(container.label());
                Err(e)
            }
        }
    }

    fn provision(&self, algorithm: RetrievalAlgorithm, container: &Container) -> Result<(), ContainerError> {
        let master = setup::master_dir(&self.algorithms_root, algorithm);
        let container_path = container.container_path();
        copy_tree(&master, &container_path).map_err(|e| ContainerError::io(&master, e))?;

        let installer = setup::installer_script(&self.algorithms_root, algorithm);
        if installer.is_file() {
            run_installer(algorithm, &installer, &container_path)?;
        }

        let input_path = container.input_path();
        for subdir in INPUT_SUBDIRS {
            let dir = input_path.join(subdir);
            std::fs::create_dir_all(&dir).map_err(|e| ContainerError::io(&dir, e))?;
        }

        let output_path = container.output_path();
        std::fs::create_dir_all(&output_path).map_err(|e| ContainerError::io(&output_path, e))?;
        Ok(())
    }

    /// Removes a container's directories and frees its label
    ///
    /// Fails with [`ContainerError::UnknownContainer`] if the label is not
    /// live, which means the caller lost track of its containers. If the
    /// directories cannot be removed, the container stays live and keeps
    /// its label.
    pub fn remove_container(&self, label: &str) -> Result<(), ContainerError> {
        let container = self
            .state
            .lock()
            .unwrap()
            .containers
            .get(label)
            .cloned()
            .ok_or_else(|| ContainerError::UnknownContainer(label.to_string()))?;

        remove_directories(&container)?;
        let mut state = self.state.lock().unwrap();
        state.containers.remove(label);
        state.labels.free(label);
        debug!("Removed container {}", label);
        Ok(())
    }

    /// Removes every container this factory issued
    ///
    /// With `include_unknown`, also sweeps every container directory found
    /// in the containers root, including those left by an earlier run that
    /// did not shut down cleanly. Every container is attempted; the first
    /// failure is returned afterwards. Returns the number of removed
    /// directories.
    pub fn remove_all_containers(&self, include_unknown: bool) -> Result<usize, ContainerError> {
        let tracked: Vec<Container> =
            self.state.lock().unwrap().containers.values().cloned().collect();

        let mut removed = 0;
        let mut first_error = None;
        for container in &tracked {
            match self.remove_container(container.label()) {
                Ok(()) => removed += container.directories().len(),
                Err(e) => {
                    warn!("Failed to remove container {}: {}", container.label(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if include_unknown {
            let (swept, error) = self.sweep_containers_root();
            removed += swept;
            if let Some(e) = error {
                first_error.get_or_insert(e);
            }
        }

        if removed > 0 {
            info!("Removed {} container directories", removed);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Removes leftover container directories, continuing past failures
    fn sweep_containers_root(&self) -> (usize, Option<ContainerError>) {
        let root = &self.containers_root;
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (0, None),
            Err(e) => return (0, Some(ContainerError::io(root, e))),
        };

        let mut removed = 0;
        let mut first_error = None;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    first_error.get_or_insert(ContainerError::io(root, e));
                    continue;
                }
            };
            let path = entry.path();
            let is_container = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(CONTAINER_PREFIX));
            if !is_container || !path.is_dir() {
                continue;
            }
            warn!("Removing leftover container directory {}", path.display());
            match remove_tree(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    first_error.get_or_insert(ContainerError::io(&path, e));
                }
            }
        }
        (removed, first_error)
    }

    /// Labels of every live container
    pub fn live_labels(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut labels: Vec<String> = state.containers.keys().cloned().collect();
        labels.sort();
        labels
    }
}

fn remove_directories(container: &Container) -> Result<(), ContainerError> {
    for dir in container.directories() {
        remove_tree(&dir).map_err(|e| ContainerError::io(&dir, e))?;
    }
    Ok(())
}

fn run_installer(
    algorithm: RetrievalAlgorithm,
    installer: &Path,
    container_path: &Path,
) -> Result<(), ContainerError> {
    debug!("Running {} in {}", installer.display(), container_path.display());

    let output = Command::new("sh")
        .arg(installer)
        .current_dir(container_path)
        .output()
        .map_err(|e| ContainerError::setup(algorithm, format!("failed to run installer: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        debug!("installer stdout: {}", stdout.trim());
    }
    if !stderr.trim().is_empty() {
        debug!("installer stderr: {}", stderr.trim());
    }

    if !output.status.success() {
        return Err(ContainerError::setup(
            algorithm,
            format!(
                "installer exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;

    /// A factory over a temporary directory with a minimal master tree
    pub(crate) fn factory(root: &Path) -> ContainerFactory {
        let algorithms_root = root.join("algorithms");
        for algorithm in RetrievalAlgorithm::ALL {
            let prf = setup::master_dir(&algorithms_root, algorithm).join("prf");
            std::fs::create_dir_all(&prf).unwrap();
            std::fs::write(prf.join("invers.f90"), "program invers").unwrap();
        }
        ContainerFactory::without_setup(&root.join("containers"), &algorithms_root)
    }

    #[test]
    fn test_create_container_builds_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());

        let container = factory.create_container(RetrievalAlgorithm::Proffast24).unwrap();
        assert!(container.container_path().join("prf/invers.f90").is_file());
        for subdir in INPUT_SUBDIRS {
            assert!(container.input_path().join(subdir).is_dir());
        }
        assert!(container.output_path().is_dir());
        assert_eq!(factory.live_labels(), vec![container.label().to_string()]);
    }

    #[test]
    fn test_installer_runs_inside_container() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        let installer = setup::installer_script(&dir.path().join("algorithms"), RetrievalAlgorithm::Proffast10);
        std::fs::write(&installer, "touch compiled\n").unwrap();

        let container = factory.create_container(RetrievalAlgorithm::Proffast10).unwrap();
        assert!(container.container_path().join("compiled").is_file());
    }

    #[test]
    fn test_failing_installer_frees_label_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        let installer = setup::installer_script(&dir.path().join("algorithms"), RetrievalAlgorithm::Proffast23);
        std::fs::write(&installer, "exit 3\n").unwrap();

        let err = factory.create_container(RetrievalAlgorithm::Proffast23).unwrap_err();
        assert!(matches!(err, ContainerError::Setup { .. }));
        assert!(factory.live_labels().is_empty());
        let leftovers = std::fs::read_dir(factory.containers_root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_remove_container() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        let container = factory.create_container(RetrievalAlgorithm::Proffast24).unwrap();

        factory.remove_container(container.label()).unwrap();
        for path in container.directories() {
            assert!(!path.exists());
        }

        let err = factory.remove_container(container.label()).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownContainer(_)));
    }

    #[test]
    fn test_concurrent_creation_yields_distinct_labels() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());

        let labels: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        factory
                            .create_container(RetrievalAlgorithm::Proffast24)
                            .unwrap()
                            .label()
                            .to_string()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let distinct: HashSet<&String> = labels.iter().collect();
        assert_eq!(distinct.len(), 8);
        assert_eq!(factory.live_labels().len(), 8);
    }

    #[test]
    fn test_remove_all_sweeps_unknown_directories() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        factory.create_container(RetrievalAlgorithm::Proffast24).unwrap();

        let stale = factory.containers_root().join("retrieval-container-dead-beef-inputs");
        std::fs::create_dir_all(&stale).unwrap();
        let unrelated = factory.containers_root().join("keep-me");
        std::fs::create_dir_all(&unrelated).unwrap();

        factory.remove_all_containers(false).unwrap();
        assert!(stale.exists());
        assert!(factory.live_labels().is_empty());

        factory.remove_all_containers(true).unwrap();
        assert!(!stale.exists());
        assert!(unrelated.exists());
    }

    /// Replaces the container's output directory with a plain file, which
    /// directory removal cannot handle
    fn obstruct(container: &Container) {
        let output = container.output_path();
        std::fs::remove_dir_all(&output).unwrap();
        std::fs::write(&output, "not a directory").unwrap();
    }

    #[test]
    fn test_failed_removal_keeps_label() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        let container = factory.create_container(RetrievalAlgorithm::Proffast24).unwrap();
        obstruct(&container);

        assert!(matches!(
            factory.remove_container(container.label()),
            Err(ContainerError::Io { .. })
        ));
        assert_eq!(factory.live_labels(), vec![container.label().to_string()]);
        assert!(factory.state.lock().unwrap().labels.contains(container.label()));

        std::fs::remove_file(container.output_path()).unwrap();
        factory.remove_container(container.label()).unwrap();
        assert!(factory.live_labels().is_empty());
        assert!(factory.state.lock().unwrap().labels.is_empty());
    }

    #[test]
    fn test_remove_all_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(dir.path());
        let stuck = factory.create_container(RetrievalAlgorithm::Proffast24).unwrap();
        let others: Vec<Container> = (0..3)
            .map(|_| factory.create_container(RetrievalAlgorithm::Proffast24).unwrap())
            .collect();
        obstruct(&stuck);

        assert!(factory.remove_all_containers(false).is_err());
        assert_eq!(factory.live_labels(), vec![stuck.label().to_string()]);
        for container in &others {
            for path in container.directories() {
                assert!(!path.exists());
            }
        }
    }
}
