//! Source file permission snapshots
//!
//! The retrieval program may change the mode of files reachable through the
//! staged interferogram links. Modes are recorded before the program runs
//! and put back afterwards.

use std::fs::Permissions;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct PermissionSnapshot {
    entries: Vec<(PathBuf, Permissions)>,
}

impl PermissionSnapshot {
    /// Records the permissions of every readable path
    pub fn capture(paths: &[PathBuf]) -> Self {
        let entries = paths
            .iter()
            .filter_map(|path| match std::fs::metadata(path) {
                Ok(metadata) => Some((path.clone(), metadata.permissions())),
                Err(e) => {
                    debug!("Cannot record permissions of {}: {}", path.display(), e);
                    None
                }
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restores every recorded permission that has changed since
    ///
    /// Returns the number of restored files.
    pub fn restore(&self) -> usize {
        let mut restored = 0;
        for (path, permissions) in &self.entries {
            let current = match std::fs::metadata(path) {
                Ok(metadata) => metadata.permissions(),
                Err(e) => {
                    warn!("Cannot restore permissions of {}: {}", path.display(), e);
                    continue;
                }
            };
            if current == *permissions {
                continue;
            }
            match std::fs::set_permissions(path, permissions.clone()) {
                Ok(()) => restored += 1,
                Err(e) => warn!("Failed to restore permissions of {}: {}", path.display(), e),
            }
        }
        if restored > 0 {
            debug!("Restored permissions of {} file(s)", restored);
        }
        restored
    }
}
