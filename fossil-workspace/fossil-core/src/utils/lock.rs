// src/utils/lock.rs
//! Exclusive advisory file locks (fs2).
//!
//! `flock`-style locks belong to the open file description, so two handles in
//! the same process exclude each other just like two processes do. The lock is
//! released when the guard drops.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{FossilError, Result};

#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Block until `<dir>/<name>.lock` is held exclusively.
    pub fn acquire(dir: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| FossilError::io(dir, e))?;
        let path = dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| FossilError::Lock {
                path: path.clone(),
                source: e,
            })?;
        file.lock_exclusive().map_err(|e| FossilError::Lock {
            path: path.clone(),
            source: e,
        })?;
        tracing::trace!(lock = %path.display(), "lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
