//! Status list of the jobs of the current run
//!
//! The orchestrator resets the list at startup and at teardown and appends
//! every job it queued. The supervisor records the container and start time
//! at dispatch and the end time once the worker is gone. Workers record how
//! many interferograms they staged. Access is serialized the same way as for
//! the input warnings list.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::domain::job::RetrievalJob;
use crate::domain::status::RetrievalStatus;
use crate::filelock::{LockError, lock_exclusive};

/// File name of the status list inside the logs root
pub const STATUS_FILE: &str = "active-processes.json";

#[derive(Debug, Error)]
pub enum StatusError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to access retrieval status list: {0}")]
    Io(#[from] std::io::Error),

    #[error("retrieval status list is not in the right format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Fields to set on one entry, `None` leaves a field as it is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub container_id: Option<String>,
    pub ifg_count: Option<usize>,
    pub process_start_time: Option<DateTime<Utc>>,
    pub process_end_time: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn dispatched(container_id: &str) -> Self {
        Self {
            container_id: Some(container_id.to_string()),
            process_start_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn staged(ifg_count: usize) -> Self {
        Self {
            ifg_count: Some(ifg_count),
            ..Default::default()
        }
    }

    pub fn finished() -> Self {
        Self {
            process_end_time: Some(Utc::now()),
            ..Default::default()
        }
    }
}

/// Handle to the status list file
#[derive(Debug, Clone)]
pub struct RetrievalStatusList {
    path: PathBuf,
}

impl RetrievalStatusList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The list stored in a logs root directory
    pub fn in_logs_root(logs_root: &Path) -> Self {
        Self::new(logs_root.join("retrieval").join(STATUS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Empties the list
    pub fn reset(&self) -> Result<(), StatusError> {
        let _lock = lock_exclusive(&self.lock_path())?;
        self.write(&[])
    }

    /// Appends a pending entry for each job
    pub fn add_jobs<'a>(
        &self,
        jobs: impl IntoIterator<Item = &'a RetrievalJob>,
    ) -> Result<(), StatusError> {
        let _lock = lock_exclusive(&self.lock_path())?;
        let mut items = self.read()?;
        items.extend(jobs.into_iter().map(RetrievalStatus::for_job));
        self.write(&items)?;
        debug!("Retrieval status list now holds {} item(s)", items.len());
        Ok(())
    }

    /// Applies an update to the entry of one job
    ///
    /// Returns false if the list has no entry for the job.
    pub fn update(&self, job: &RetrievalJob, update: StatusUpdate) -> Result<bool, StatusError> {
        let _lock = lock_exclusive(&self.lock_path())?;
        let mut items = self.read()?;
        let Some(item) = items.iter_mut().find(|s| s.concerns(job)) else {
            return Ok(false);
        };

        if let Some(container_id) = update.container_id {
            item.container_id = Some(container_id);
        }
        if let Some(ifg_count) = update.ifg_count {
            item.ifg_count = Some(ifg_count);
        }
        if let Some(start) = update.process_start_time {
            item.process_start_time = Some(start);
        }
        if let Some(end) = update.process_end_time {
            item.process_end_time = Some(end);
        }
        self.write(&items)?;
        Ok(true)
    }

    /// Reads the current list
    pub fn list(&self) -> Result<Vec<RetrievalStatus>, StatusError> {
        let _lock = lock_exclusive(&self.lock_path())?;
        self.read()
    }

    fn read(&self) -> Result<Vec<RetrievalStatus>, StatusError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, items: &[RetrievalStatus]) -> Result<(), StatusError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(items)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
