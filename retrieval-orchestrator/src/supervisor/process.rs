//! Worker processes
//!
//! Every session runs in a freshly spawned `retrieval-runner` process. The
//! supervisor only talks to workers through [`WorkerLauncher`] and
//! [`WorkerHandle`], which lets scheduling be tested without real processes.

use anyhow::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use retrieval_core::domain::session::Session;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Name of the worker binary
pub const WORKER_BINARY: &str = "retrieval-runner";

/// Starts one worker process per session
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, session: &Session) -> Result<Box<dyn WorkerHandle>>;
}

/// A running (or finished, not yet reaped) worker
pub trait WorkerHandle: Send {
    /// Process name used in logs
    fn name(&self) -> &str;

    /// Returns false once the process has exited, reaping it
    fn is_alive(&mut self) -> bool;

    /// Asks the process to terminate
    fn terminate(&mut self);

    /// Kills the process without giving it a chance to clean up
    fn kill(&mut self);
}

/// Launches `retrieval-runner --config <config> --session <session.json>`
pub struct ProcessLauncher {
    worker_executable: PathBuf,
    config_path: PathBuf,
}

impl ProcessLauncher {
    pub fn new(worker_executable: PathBuf, config_path: &Path) -> Self {
        Self {
            worker_executable,
            config_path: config_path.to_path_buf(),
        }
    }

    /// The worker binary installed next to the running executable
    pub fn default_worker_executable() -> Result<PathBuf> {
        let current = std::env::current_exe().context("Failed to locate current executable")?;
        let dir = current
            .parent()
            .context("Current executable has no parent directory")?;
        Ok(dir.join(WORKER_BINARY))
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, session: &Session) -> Result<Box<dyn WorkerHandle>> {
        let name = session.name();
        let child = Command::new(&self.worker_executable)
            .arg("--config")
            .arg(&self.config_path)
            .arg("--session")
            .arg(session.container.session_path())
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to spawn {} for {}",
                    self.worker_executable.display(),
                    name
                )
            })?;

        debug!("Spawned {} with pid {:?}", name, child.id());
        Ok(Box::new(ChildWorker { name, child }))
    }
}

/// A worker backed by an OS child process
pub struct ChildWorker {
    name: String,
    child: Child,
}

impl ChildWorker {
    pub fn new(name: impl Into<String>, child: Child) -> Self {
        Self {
            name: name.into(),
            child,
        }
    }
}

impl WorkerHandle for ChildWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Process \"{}\" exited with {}", self.name, status);
                false
            }
            Err(e) => {
                warn!("Failed to poll process \"{}\": {}", self.name, e);
                false
            }
        }
    }

    fn terminate(&mut self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("Failed to send SIGTERM to \"{}\": {}", self.name, e);
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to send SIGKILL to \"{}\": {}", self.name, e);
        }
    }
}
