//! File-based locking to prevent concurrent runs.
//!
//! Uses flock-style advisory locking so only one vpnsieve run writes a
//! given output directory at a time.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file name inside the output directory
pub const LOCK_FILE: &str = ".vpnsieve.lock";

/// A guard that holds an exclusive lock on an output directory.
/// The lock is automatically released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock on `dir`.
    /// Returns an error if another run already holds it.
    ///
    /// Uses OpenOptions with create+read+write to avoid TOCTOU race
    /// between file creation and lock acquisition.
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
        let path = dir.join(LOCK_FILE);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {:?}", path))?;

        // Non-blocking
        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another vpnsieve run is already using {:?}.\n\
                 Wait for it to finish, or remove the lock file: {:?}",
                dir,
                path
            )
        })?;

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
