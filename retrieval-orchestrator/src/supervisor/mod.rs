//! Process supervisor
//!
//! The scheduling loop of a run. Each tick it:
//! 1. starts workers while fewer than `max_process_count` are alive and jobs
//!    are queued
//! 2. reaps finished workers, removes their containers and any output they
//!    left half-published
//! 3. stops once the queue is empty and no worker is alive
//!
//! Between ticks it sleeps for the poll interval. A shutdown signal takes
//! precedence over the next tick. Whether a job succeeded is decided by the worker alone; the
//! supervisor only needs the process to be gone to reclaim its container.

mod process;

pub use process::{ChildWorker, ProcessLauncher, WORKER_BINARY, WorkerHandle, WorkerLauncher};

use anyhow::Result;
use retrieval_core::domain::session::Session;
use retrieval_core::fsutil::remove_tree;
use retrieval_core::layout::OutputLocation;
use retrieval_core::status::{RetrievalStatusList, StatusUpdate};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::containers::ContainerFactory;
use crate::context::RunContext;
use crate::queue::JobQueue;
use crate::session::SessionBuilder;

/// Binding of a live worker to the session (and container) it owns
struct ProcessRecord {
    session: Session,
    handle: Box<dyn WorkerHandle>,
}

/// Timing of the shutdown escalation
#[derive(Debug, Clone, Copy)]
pub struct ShutdownPolicy {
    /// Interval between two liveness checks
    pub poll_step: Duration,
    /// Time after SIGTERM before a worker is killed
    pub grace: Duration,
    /// Time after SIGTERM after which a surviving worker is given up on
    pub give_up: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            poll_step: Duration::from_millis(200),
            grace: Duration::from_secs(5),
            give_up: Duration::from_secs(10),
        }
    }
}

/// Result of one scheduling tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Jobs are queued or workers are alive
    Pending,
    /// Nothing left to do
    Finished,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
}

pub struct Supervisor {
    ctx: RunContext,
    factory: Arc<ContainerFactory>,
    builder: SessionBuilder,
    launcher: Box<dyn WorkerLauncher>,
    queue: JobQueue,
    processes: Vec<ProcessRecord>,
    status: RetrievalStatusList,
    shutdown_policy: ShutdownPolicy,
}

impl Supervisor {
    pub fn new(
        ctx: RunContext,
        factory: Arc<ContainerFactory>,
        launcher: Box<dyn WorkerLauncher>,
        queue: JobQueue,
    ) -> Self {
        let general = &ctx.config.retrieval.general;
        let builder = SessionBuilder::new(&general.algorithms_root);
        let status = RetrievalStatusList::in_logs_root(&general.logs_root);
        Self {
            ctx,
            factory,
            builder,
            launcher,
            queue,
            processes: Vec::new(),
            status,
            shutdown_policy: ShutdownPolicy::default(),
        }
    }

    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Number of workers currently tracked
    pub fn live_count(&self) -> usize {
        self.processes.len()
    }

    /// Number of jobs still waiting
    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Runs one scheduling step
    pub fn tick(&mut self) -> TickOutcome {
        self.dispatch();
        self.reap();

        if self.queue.is_empty() && self.processes.is_empty() {
            TickOutcome::Finished
        } else {
            TickOutcome::Pending
        }
    }

    fn dispatch(&mut self) {
        let max = self.ctx.config.retrieval.general.max_process_count;
        while self.processes.len() < max {
            let Some(job) = self.queue.pop() else {
                break;
            };

            let slug = format!("{}/{}", job.sensor_id(), job.slug());
            let session = match self.builder.build(&self.factory, job) {
                Ok(session) => session,
                Err(e) => {
                    error!("Failed to create session for {}: {:#}", slug, e);
                    continue;
                }
            };

            match self.launcher.launch(&session) {
                Ok(handle) => {
                    info!("Process \"{}\": starting", handle.name());
                    self.record_status(&session, StatusUpdate::dispatched(session.container.label()));
                    self.processes.push(ProcessRecord { session, handle });
                }
                Err(e) => {
                    error!("Failed to start worker for {}: {:#}", slug, e);
                    self.remove_container(&session);
                }
            }
        }
    }

    fn reap(&mut self) {
        let mut index = 0;
        while index < self.processes.len() {
            if self.processes[index].handle.is_alive() {
                index += 1;
                continue;
            }
            let record = self.processes.swap_remove(index);
            info!("Process \"{}\": finished processing", record.handle.name());
            self.record_status(&record.session, StatusUpdate::finished());
            cleanup_after_worker(&record.session, &self.factory, &self.ctx);
        }
    }

    fn record_status(&self, session: &Session, update: StatusUpdate) {
        if let Err(e) = self.status.update(&session.job, update) {
            error!("Failed to update retrieval status of {}: {}", session.name(), e);
        }
    }

    fn remove_container(&self, session: &Session) {
        match self.factory.remove_container(session.container.label()) {
            Ok(()) => info!("Process \"{}\": removed container", session.name()),
            Err(e) => error!("Failed to remove container of {}: {}", session.name(), e),
        }
    }

    /// Runs ticks until the work is done or `shutdown` resolves
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        let poll_interval = self.ctx.config.poll_interval();
        tokio::pin!(shutdown);

        let mut wait = Duration::ZERO;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Automation was stopped by signal");
                    self.shutdown().await;
                    return Ok(RunOutcome::Interrupted);
                }
                _ = tokio::time::sleep(wait) => {}
            }

            if self.tick() == TickOutcome::Finished {
                info!("No more things to process");
                break;
            }
            wait = poll_interval;
        }

        self.factory.remove_all_containers(false)?;
        Ok(RunOutcome::Completed)
    }

    /// Stops every worker and removes everything they owned
    ///
    /// Workers receive SIGTERM, are killed after the grace period and are
    /// given up on (with a warning) after the second window. Never blocks
    /// longer than that.
    pub async fn shutdown(&mut self) {
        let policy = self.shutdown_policy;
        info!("Stopping {} worker(s)", self.processes.len());

        for record in &mut self.processes {
            record.handle.terminate();
        }

        let started = Instant::now();
        let mut killed = false;
        loop {
            self.processes.retain_mut(|record| {
                let alive = record.handle.is_alive();
                if !alive {
                    info!("Process \"{}\": stopped", record.handle.name());
                    cleanup_after_worker(&record.session, &self.factory, &self.ctx);
                }
                alive
            });

            if self.processes.is_empty() {
                break;
            }

            let elapsed = started.elapsed();
            if elapsed > policy.give_up {
                for record in &self.processes {
                    warn!(
                        "Process \"{}\": could not be killed within {:?}",
                        record.handle.name(),
                        policy.give_up
                    );
                }
                break;
            }
            if elapsed > policy.grace && !killed {
                for record in &mut self.processes {
                    warn!(
                        "Process \"{}\": did not terminate after {:?}, sending SIGKILL",
                        record.handle.name(),
                        policy.grace
                    );
                    record.handle.kill();
                }
                killed = true;
            }

            tokio::time::sleep(policy.poll_step).await;
        }

        for record in self.processes.drain(..) {
            cleanup_after_worker(&record.session, &self.factory, &self.ctx);
        }

        if let Err(e) = self.factory.remove_all_containers(false) {
            error!("Failed to remove remaining containers: {}", e);
        }
        match self.status.reset() {
            Ok(()) => info!("Reset retrieval status list"),
            Err(e) => error!("Failed to reset retrieval status list: {}", e),
        }
        info!("Teardown is done");
    }
}

/// Removes a stopped worker's container and any half-published output
fn cleanup_after_worker(session: &Session, factory: &ContainerFactory, ctx: &RunContext) {
    let location = OutputLocation::for_job(&ctx.config.general.data.results, &session.job);
    for staging in location.stagings() {
        if staging.exists() {
            warn!("Removing unfinished output {}", staging.display());
            if let Err(e) = remove_tree(&staging) {
                error!("Failed to remove {}: {}", staging.display(), e);
            }
        }
    }

    match factory.remove_container(session.container.label()) {
        Ok(()) => info!("Process \"{}\": removed container", session.name()),
        Err(e) => error!("Failed to remove container of {}: {}", session.name(), e),
    }
}

/// Resolves on the first SIGINT or SIGTERM
///
/// Handlers are installed when this is called, not when the future is first
/// polled.
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    })
}
