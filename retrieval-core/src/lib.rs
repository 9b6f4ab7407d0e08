//! Retrieval Core
//!
//! Core types and abstractions shared by the retrieval orchestrator,
//! the retrieval runner and the operator CLI.
//!
//! This crate contains:
//! - Domain types: sensor data contexts, jobs, containers, sessions, manifests
//! - Layout: where inputs are read from and where results are published
//! - Configuration: the TOML configuration shared by every process of a run
//! - Input warnings: the persistent, file-locked "unresolved input warnings" list
//! - Retrieval status: the file-locked progress list of the current run

pub mod config;
pub mod domain;
pub mod filelock;
pub mod fsutil;
pub mod layout;
pub mod status;
pub mod template;
pub mod warnings;
