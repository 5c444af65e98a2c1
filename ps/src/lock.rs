//! Advisory file lock guarding a document's read-modify-write cycle

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::StoreError;

/// Lock file path for a document: `<document>.lock` next to it
pub fn lock_path_for(document: &Path) -> PathBuf {
    let mut name = document.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    document.with_file_name(name)
}

/// Exclusive advisory lock; released when dropped
///
/// The lock file itself is left on disk. Only the `flock` is released, so a
/// waiter never ends up holding a lock on an unlinked inode.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Block until the exclusive lock is held
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        debug!(?path, "StoreLock::acquire: called");
        let file = open_lock_file(path)?;
        file.lock_exclusive().map_err(|e| StoreError::io(path, e))?;
        debug!("StoreLock::acquire: lock held");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock without waiting, failing with `Locked` if another holder exists
    pub fn try_acquire(path: &Path) -> Result<Self, StoreError> {
        debug!(?path, "StoreLock::try_acquire: called");
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("StoreLock::try_acquire: lock held");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                debug!("StoreLock::try_acquire: lock contended");
                Err(StoreError::Locked {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = ?self.path, error = %e, "StoreLock::drop: unlock failed");
        } else {
            debug!(path = ?self.path, "StoreLock::drop: released");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))
}
