//! Core domain types
//!
//! These types describe one unit of retrieval work and the resources bound to
//! it while it runs. They are shared between the orchestrator (which creates
//! them) and the runner (which consumes a serialized session).

pub mod container;
pub mod context;
pub mod job;
pub mod manifest;
pub mod session;
pub mod status;
pub mod warning;
