//! Exclusive lock around the item snapshot.
//!
//! Every read-modify-write of `.taskorder/items.json` happens while holding
//! an `fs2` lock on `items.lock`. The lock serialises whole-file rewrites
//! between processes and threads; it is not an allocation lock, so two
//! writers working from the same stale read can still pick the same
//! position.
//!
//! The holder writes its pid and acquisition time into the lock file so a
//! timed-out waiter can say who it was waiting on.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

const LOCK_RETRY_INTERVAL_MS: u64 = 25;

/// Who currently holds (or last held) the items lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    /// Read the holder record left in a lock file, if any
    pub fn read(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(content.trim()).ok()
    }
}

fn is_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // Windows reports sharing and lock violations as raw os errors
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Guard over `items.lock`; released on drop
#[derive(Debug)]
pub struct ItemsLock {
    file: File,
    path: PathBuf,
}

impl ItemsLock {
    /// Wait up to `timeout_ms` for the lock
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            if Instant::now() >= deadline {
                let holder = LockHolder::read(path);
                tracing::warn!(
                    path = %path.display(),
                    timeout_ms,
                    holder_pid = holder.as_ref().map(|h| h.pid),
                    "items lock timeout"
                );
                return Err(Error::LockFailed(path.to_path_buf()));
            }
            std::thread::sleep(Duration::from_millis(LOCK_RETRY_INTERVAL_MS));
        }
    }

    /// Take the lock if it is free; `Ok(None)` when another holder has it
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                let mut lock = ItemsLock {
                    file,
                    path: path.to_path_buf(),
                };
                lock.record_holder()?;
                Ok(Some(lock))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Holder record as written by this guard
    pub fn holder(&mut self) -> Option<LockHolder> {
        let mut content = String::new();
        self.file.seek(SeekFrom::Start(0)).ok()?;
        self.file.read_to_string(&mut content).ok()?;
        serde_json::from_str(content.trim()).ok()
    }

    fn record_holder(&mut self) -> Result<()> {
        let record = serde_json::to_string(&LockHolder::current())?;
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(record.as_bytes())?;
        Ok(())
    }
}

impl Drop for ItemsLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
