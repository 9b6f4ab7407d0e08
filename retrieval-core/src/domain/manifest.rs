//! Provenance manifest written next to every published result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::Session;

/// File name of the manifest inside a published output directory
pub const MANIFEST_FILE: &str = "about.json";

/// Which bucket a job's output was published into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Successful,
    Failed,
}

impl Outcome {
    /// Name of the results subdirectory for this outcome
    pub fn dir_name(&self) -> &'static str {
        match self {
            Outcome::Successful => "successful",
            Outcome::Failed => "failed",
        }
    }
}

/// How the external retrieval program ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgramExit {
    /// The program exited on its own with this code
    Exited { code: i32 },
    /// The program was killed by a signal
    Signaled,
    /// The program could not be started at all
    SpawnFailed { message: String },
}

/// Provenance record of one published output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub automation_version: String,
    pub generation_time: DateTime<Utc>,
    pub outcome: Outcome,
    pub program_exit: ProgramExit,
    /// Diagnostic error signatures found in the program's log files
    #[serde(default)]
    pub diagnostics: Vec<String>,
    pub config: serde_json::Value,
    pub session: Session,
}
