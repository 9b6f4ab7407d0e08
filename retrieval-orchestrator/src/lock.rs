//! Run-wide mutual exclusion
//!
//! Only one supervisor (or container sweep) may work on a containers root at
//! a time. The lock file sits next to the containers root, not inside it, so
//! sweeping the root never deletes it.

use retrieval_core::filelock::{FileLock, LockError, try_lock_exclusive};
use std::path::{Path, PathBuf};

/// Path of the run lock belonging to a containers root
pub fn run_lock_path(containers_root: &Path) -> PathBuf {
    containers_root.with_extension("lock")
}

/// Acquires the run lock or fails immediately if another run holds it
pub fn acquire_run_lock(containers_root: &Path) -> Result<FileLock, LockError> {
    try_lock_exclusive(&run_lock_path(containers_root))
}
