//! Retrieval Orchestrator
//!
//! Runs every pending retrieval of the configured jobs, each in its own
//! worker process and its own container.
//!
//! Architecture:
//! - Context: configuration and metadata of one run, passed explicitly
//! - Queue: which jobs still need processing, in which order
//! - Containers: isolated directory trees, one per in-flight job
//! - Session: a job bound to its container, written for the worker
//! - Supervisor: bounded-concurrency scheduling loop with signal-driven
//!   shutdown
//! - Lock: at most one run per containers root

pub mod containers;
pub mod context;
pub mod error;
pub mod lock;
pub mod logging;
pub mod queue;
pub mod session;
pub mod supervisor;

pub use containers::ContainerFactory;
pub use context::RunContext;
pub use error::ContainerError;
pub use queue::JobQueue;
pub use session::SessionBuilder;
pub use supervisor::{RunOutcome, Supervisor};
