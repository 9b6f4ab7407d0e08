//! Retrieval program invocation
//!
//! Runs `<runtime> {algorithms_root}/{algorithm}/{entrypoint} <label> <arg>`
//! inside the container, where `<arg>` is the rendered config file or, for
//! programs without one, the session file. The exit status is logged and
//! recorded but never decides whether the job succeeded.

use retrieval_core::config::RetrievalGeneralConfig;
use retrieval_core::domain::manifest::ProgramExit;
use retrieval_core::domain::session::Session;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::signals::Teardown;

#[derive(Debug, Clone)]
pub struct ProgramInvocation {
    runtime: String,
    entrypoint: PathBuf,
    label: String,
    argument: PathBuf,
    working_dir: PathBuf,
}

impl ProgramInvocation {
    /// Resolves the invocation for a session, with absolute paths since the
    /// program runs inside the container directory
    pub fn for_session(
        general: &RetrievalGeneralConfig,
        session: &Session,
    ) -> std::io::Result<Self> {
        let container = &session.container;
        let entrypoint = general
            .algorithms_root
            .join(session.job.retrieval_algorithm.as_str())
            .join(&general.program_entrypoint);
        let argument = container
            .config_path()
            .unwrap_or_else(|| container.session_path());

        Ok(Self {
            runtime: general.program_runtime.clone(),
            entrypoint: std::path::absolute(entrypoint)?,
            label: container.label().to_string(),
            argument: std::path::absolute(argument)?,
            working_dir: std::path::absolute(container.container_path())?,
        })
    }

    /// Runs the program to completion
    ///
    /// The program gets its own process group so that a Ctrl-C in the
    /// operator's terminal reaches it only through the worker's teardown.
    pub async fn run(&self, teardown: &Teardown) -> ProgramExit {
        info!(
            "Running {} {} {} {}",
            self.runtime,
            self.entrypoint.display(),
            self.label,
            self.argument.display()
        );

        let child = Command::new(&self.runtime)
            .arg(&self.entrypoint)
            .arg(&self.label)
            .arg(&self.argument)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start retrieval program: {}", e);
                return ProgramExit::SpawnFailed {
                    message: e.to_string(),
                };
            }
        };

        if let Some(pid) = child.id() {
            debug!("Retrieval program started with pid {}", pid);
            teardown.program_started(pid);
        }
        let output = child.wait_with_output().await;
        teardown.program_finished();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to wait for retrieval program: {}", e);
                return ProgramExit::SpawnFailed {
                    message: format!("failed to wait for program: {}", e),
                };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("Retrieval program stdout:\n{}", stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            debug!("Retrieval program stderr:\n{}", stderr.trim_end());
        }

        match output.status.code() {
            Some(0) => {
                info!("Retrieval program exited with code 0");
                ProgramExit::Exited { code: 0 }
            }
            Some(code) => {
                warn!("Retrieval program exited with code {}", code);
                ProgramExit::Exited { code }
            }
            None => {
                warn!("Retrieval program was terminated by a signal");
                ProgramExit::Signaled
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::staging::tests::{config, session};
    use std::path::Path;

    /// Installs `script` as the entrypoint of the session's algorithm
    pub(crate) fn install_program(root: &Path, script: &str) {
        let dir = root.join("algorithms/proffast-2.4");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("run.sh"), script).unwrap();
    }

    #[tokio::test]
    async fn test_program_runs_in_container_with_label_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let session = session(dir.path());
        install_program(dir.path(), "echo \"$1 $2\" > args.txt\nexit 3\n");

        let invocation =
            ProgramInvocation::for_session(&config.retrieval.general, &session).unwrap();
        let exit = invocation.run(&Teardown::new()).await;
        assert_eq!(exit, ProgramExit::Exited { code: 3 });

        let args =
            std::fs::read_to_string(session.container.container_path().join("args.txt")).unwrap();
        assert!(args.starts_with("ab12-cd34 "));
        assert!(args.trim_end().ends_with("-inputs/pylot_config.yml"));
    }

    #[tokio::test]
    async fn test_missing_runtime_is_a_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.retrieval.general.program_runtime = "/nonexistent/runtime".to_string();
        let session = session(dir.path());

        let invocation =
            ProgramInvocation::for_session(&config.retrieval.general, &session).unwrap();
        let exit = invocation.run(&Teardown::new()).await;
        assert!(matches!(exit, ProgramExit::SpawnFailed { .. }));
    }
}
