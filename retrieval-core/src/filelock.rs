//! Advisory file locks
//!
//! Exclusive `flock(2)` locks on dedicated lock files. The lock is released
//! when the returned guard is dropped or the holding process dies, so a
//! crashed run never leaves a stale lock behind.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Guard holding an exclusive lock until dropped
pub type FileLock = Flock<File>;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{path} is locked by another process")]
    Held { path: PathBuf },

    #[error("failed to open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to lock {path}: {source}")]
    Lock { path: PathBuf, source: Errno },
}

/// Blocks until an exclusive lock on `path` is acquired
pub fn lock_exclusive(path: &Path) -> Result<FileLock, LockError> {
    let file = open_lock_file(path)?;
    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_file, source)| LockError::Lock {
        path: path.to_path_buf(),
        source,
    })
}

/// Acquires an exclusive lock on `path` or fails immediately if another
/// process holds it
pub fn try_lock_exclusive(path: &Path) -> Result<FileLock, LockError> {
    let file = open_lock_file(path)?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(lock),
        Err((_file, Errno::EWOULDBLOCK)) => Err(LockError::Held {
            path: path.to_path_buf(),
        }),
        Err((_file, source)) => Err(LockError::Lock {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn open_lock_file(path: &Path) -> Result<File, LockError> {
    let open_error = |source| LockError::Open {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(open_error)?;
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(open_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let first = try_lock_exclusive(&path).expect("first lock should succeed");

        let second = try_lock_exclusive(&path);
        assert!(matches!(second, Err(LockError::Held { .. })));

        drop(first);
        let third = try_lock_exclusive(&path).expect("lock should be free again");
        drop(third);
    }
}
