//! # Data Directory Lock
//!
//! Uses `fs2` for cross-platform file locking (flock on Unix, LockFile on
//! Windows). Two gateways writing one audit chain would fork it, so the
//! second process is refused outright.

use crate::domain::errors::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Exclusive lock on a data directory, released on drop.
pub struct DataDirLock {
    /// Kept open to hold the lock
    file: File,
    path: PathBuf,
    pid: u32,
}

impl DataDirLock {
    /// Lock file name
    const LOCK_FILE: &'static str = "LOCK";

    /// Acquire the lock without waiting.
    ///
    /// # Errors
    ///
    /// `StoreError::Locked` if another process (or another store in this
    /// process) holds it.
    pub fn acquire(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(Self::LOCK_FILE);

        // Not truncated before locking: the holder's PID must survive a
        // failed attempt.
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(StoreError::io)?;

        if file.try_lock_exclusive().is_err() {
            let holder = Self::read_existing_pid(&path)
                .map(|pid| format!(" by process {pid}"))
                .unwrap_or_default();
            return Err(StoreError::Locked {
                path: format!("{}{holder}", path.display()),
            });
        }

        let pid = std::process::id();
        file.set_len(0).map_err(StoreError::io)?;
        file.seek(SeekFrom::Start(0)).map_err(StoreError::io)?;
        writeln!(file, "{pid}").map_err(StoreError::io)?;
        file.sync_all().map_err(StoreError::io)?;

        Ok(Self { file, path, pid })
    }

    /// PID written into the lock file.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing_pid(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}
