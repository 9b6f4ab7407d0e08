//! Persistent list of unresolved input warnings
//!
//! Workers of one run and operators between runs all touch this file. Every
//! mutation takes an exclusive lock on a sibling `.lock` file, reads the
//! list, applies one change, writes it back and releases the lock.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::domain::warning::InputWarning;
use crate::filelock::{LockError, lock_exclusive};

/// File name of the warnings list inside the logs root
pub const WARNINGS_FILE: &str = "input-warnings-to-be-resolved.json";

#[derive(Debug, Error)]
pub enum WarningsError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to access input warnings list: {0}")]
    Io(#[from] std::io::Error),

    #[error("input warnings list is not in the right format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Handle to the warnings list file
#[derive(Debug, Clone)]
pub struct InputWarningsList {
    path: PathBuf,
}

impl InputWarningsList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The list stored in a logs root directory
    pub fn in_logs_root(logs_root: &Path) -> Self {
        Self::new(logs_root.join("retrieval").join(WARNINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Records a warning, replacing any earlier one for the same sensor and
    /// window start
    pub fn add(
        &self,
        sensor_id: &str,
        from_datetime: DateTime<Utc>,
        message: &str,
    ) -> Result<(), WarningsError> {
        self.update(|items| {
            items.retain(|w| !w.concerns(sensor_id, &from_datetime));
            items.push(InputWarning {
                sensor_id: sensor_id.to_string(),
                from_datetime,
                message: message.to_string(),
                last_checked: Utc::now(),
            });
        })
    }

    /// Clears the warning for one sensor and window start, if any
    pub fn remove(&self, sensor_id: &str, from_datetime: DateTime<Utc>) -> Result<(), WarningsError> {
        self.update(|items| items.retain(|w| !w.concerns(sensor_id, &from_datetime)))
    }

    /// Clears every warning, or only those of one sensor
    ///
    /// Returns the number of removed warnings.
    pub fn clear(&self, sensor_id: Option<&str>) -> Result<usize, WarningsError> {
        let mut removed = 0;
        self.update(|items| {
            let before = items.len();
            match sensor_id {
                Some(id) => items.retain(|w| w.sensor_id != id),
                None => items.clear(),
            }
            removed = before - items.len();
        })?;
        Ok(removed)
    }

    /// Reads the current list
    pub fn list(&self) -> Result<Vec<InputWarning>, WarningsError> {
        let _lock = lock_exclusive(&self.lock_path())?;
        self.read()
    }

    fn update(&self, change: impl FnOnce(&mut Vec<InputWarning>)) -> Result<(), WarningsError> {
        let _lock = lock_exclusive(&self.lock_path())?;
        let mut items = self.read()?;
        change(&mut items);
        self.write(&items)?;
        debug!("Input warnings list now holds {} item(s)", items.len());
        Ok(())
    }

    fn read(&self) -> Result<Vec<InputWarning>, WarningsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, items: &[InputWarning]) -> Result<(), WarningsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(items)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
