//! Session domain type

use serde::{Deserialize, Serialize};

use super::container::Container;
use super::job::RetrievalJob;

/// A retrieval job bound to the container it runs in
///
/// Created once by the orchestrator, serialized into the container and
/// consumed by exactly one worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub job: RetrievalJob,
    pub container: Container,
}

impl Session {
    /// Human readable process name, e.g.
    /// `retrieval-session-mc-2022-06-02T00:00:00-ab12-cd34`
    pub fn name(&self) -> String {
        let ctx = &self.job.sensor_data_context;
        format!(
            "retrieval-session-{}-{}-{}",
            ctx.sensor_id,
            ctx.from_datetime.format("%Y-%m-%dT%H:%M:%S"),
            self.container.label()
        )
    }
}
