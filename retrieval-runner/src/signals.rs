//! Signal handling of a worker
//!
//! SIGINT is ignored while inputs are staged or outputs are published, so an
//! operator's Ctrl-C cannot interrupt a half-done write. Outside of these
//! critical sections, SIGINT and SIGTERM both tear the worker down: the
//! retrieval program is killed, the log is flushed and the process exits.
//! A SIGTERM that arrives during a critical section waits for it to end.

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, killpg, sigaction};
use nix::unistd::Pid;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tracing::{info, warn};

/// Ignores SIGINT until dropped, then restores the previous disposition
pub struct InterruptGuard {
    previous: Option<SigAction>,
}

impl InterruptGuard {
    pub fn new() -> Self {
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        // SAFETY: installs SIG_IGN, which runs no code in signal context
        match unsafe { sigaction(Signal::SIGINT, &ignore) } {
            Ok(previous) => Self {
                previous: Some(previous),
            },
            Err(e) => {
                warn!("Failed to ignore SIGINT: {}", e);
                Self { previous: None }
            }
        }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // SAFETY: restores the disposition that was active before
            if let Err(e) = unsafe { sigaction(Signal::SIGINT, &previous) } {
                warn!("Failed to restore SIGINT handler: {}", e);
            }
        }
    }
}

/// A section that must not be interrupted
pub struct CriticalSection {
    _interrupts: InterruptGuard,
    _lock: OwnedMutexGuard<()>,
}

/// Teardown hook of a worker
#[derive(Clone, Default)]
pub struct Teardown {
    critical: Arc<Mutex<()>>,
    /// Process group of the running retrieval program, 0 if none
    program_group: Arc<AtomicU32>,
}

impl Teardown {
    /// A hook that is not connected to any signal yet
    pub fn new() -> Self {
        Self {
            critical: Arc::new(Mutex::new(())),
            program_group: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Installs the SIGINT and SIGTERM handlers
    pub fn install() -> std::io::Result<Self> {
        let teardown = Self::new();

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let hook = teardown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
            let _critical = hook.tear_down().await;
            std::process::exit(0);
        });

        info!("Established graceful teardown hook");
        Ok(teardown)
    }

    /// Waits for the running critical section to end, then kills the
    /// retrieval program
    ///
    /// No further critical section can start while the returned guard is
    /// held.
    pub async fn tear_down(&self) -> MutexGuard<'_, ()> {
        let critical = self.critical.lock().await;
        self.kill_program();
        info!("Container was killed");
        critical
    }

    /// Enters a critical section
    pub async fn critical(&self) -> CriticalSection {
        let lock = Arc::clone(&self.critical).lock_owned().await;
        CriticalSection {
            _interrupts: InterruptGuard::new(),
            _lock: lock,
        }
    }

    /// Remembers the process group of the started retrieval program
    pub fn program_started(&self, pid: u32) {
        self.program_group.store(pid, Ordering::SeqCst);
    }

    pub fn program_finished(&self) {
        self.program_group.store(0, Ordering::SeqCst);
    }

    fn kill_program(&self) {
        let group = self.program_group.swap(0, Ordering::SeqCst);
        if group == 0 {
            return;
        }
        info!("Killing retrieval program (process group {})", group);
        if let Err(e) = killpg(Pid::from_raw(group as i32), Signal::SIGKILL) {
            warn!("Failed to kill retrieval program: {}", e);
        }
    }
}
