// SPDX-License-Identifier: MIT

//! Atomic write-via-temp-then-rename and a short-TTL advisory file lock with
//! stale-lock reap (spec §4.A registry write, §6 "atomic write-via-rename").

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;

use crate::paths::set_file_permissions;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("lock {path} held by another writer after {waited_ms}ms")]
    LockBusy { path: PathBuf, waited_ms: u64 },
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io { path: path.to_path_buf(), source }
}

/// Writes `contents` to `path` by writing a sibling `.tmp` file and renaming
/// it over the target, so concurrent readers never observe a partial write.
/// Ensures the parent directory exists first and sets file mode 0600.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp_path = tmp_sibling(path);
    {
        let mut f = std::fs::File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
        f.write_all(contents).map_err(|e| io_err(&tmp_path, e))?;
        f.sync_all().map_err(|e| io_err(&tmp_path, e))?;
    }
    set_file_permissions(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
    path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()))
}

/// A short-TTL advisory lock file used to serialize writers to a shared JSON
/// document (registry.lock, leases, queue). Busy-waits up to `max_wait` with
/// stale-lock reap: if the lock file's mtime is older than `stale_after`, it
/// is removed and reacquired rather than waited on forever.
pub struct FileLock {
    path: PathBuf,
    max_wait: Duration,
    stale_after: Duration,
}

impl FileLock {
    pub fn new(path: PathBuf) -> Self {
        Self { path, max_wait: Duration::from_secs(2), stale_after: Duration::from_secs(60) }
    }

    pub fn with_max_wait(mut self, d: Duration) -> Self {
        self.max_wait = d;
        self
    }

    pub fn with_stale_after(mut self, d: Duration) -> Self {
        self.stale_after = d;
        self
    }

    /// Runs `f` while holding an exclusive OS-level lock on this path,
    /// busy-waiting (reaping staleness along the way) until `max_wait`
    /// elapses.
    pub fn with_lock<T>(&self, f: impl FnOnce() -> Result<T, StorageError>) -> Result<T, StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let deadline = Instant::now() + self.max_wait;
        let file = loop {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)
                .map_err(|e| io_err(&self.path, e))?;
            match file.try_lock_exclusive() {
                Ok(()) => break file,
                Err(_) => {
                    self.reap_if_stale();
                    if Instant::now() >= deadline {
                        return Err(StorageError::LockBusy {
                            path: self.path.clone(),
                            waited_ms: self.max_wait.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        };

        let result = f();
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    fn reap_if_stale(&self) {
        let Ok(meta) = std::fs::metadata(&self.path) else { return };
        let Ok(age) = meta.modified().and_then(|m| m.elapsed().map_err(std::io::Error::other)) else {
            return;
        };
        if age > self.stale_after {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
