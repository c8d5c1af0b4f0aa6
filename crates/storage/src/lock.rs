// SPDX-License-Identifier: MIT

//! Daemon singleton lock (`daemon.lock`, spec §3 `DaemonRecord`-adjacent,
//! §4.A `acquireDaemonLock`, §6).

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atomic::write_atomic;
use crate::paths::ControlPaths;

/// Age after which an existing lock file is reclaimable even if its owner
/// pid looks alive-by-record (spec §4.A: "file age exceeds stale threshold
/// (60s)").
pub const STALE_THRESHOLD_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock held by pid {pid} (daemon {daemon_id})")]
    LockHeld { pid: u32, daemon_id: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockContents {
    daemon_id: String,
    pid: u32,
    started_at: DateTime<Utc>,
    acquired_at: DateTime<Utc>,
    token: String,
}

pub struct DaemonLock {
    path: PathBuf,
}

/// Proof of ownership returned by [`DaemonLock::acquire`]. Release is a
/// no-op unless the file on disk still carries this holder's `token`
/// (tamper-safe release, spec §4.A).
pub struct DaemonLockGuard {
    path: PathBuf,
    token: String,
}

impl DaemonLock {
    pub fn new(paths: &ControlPaths) -> Self {
        Self { path: paths.daemon_lock_file() }
    }

    /// Attempts to exclusively create/claim the lock. Fails with
    /// `LockHeld` if an existing lock's owner pid is alive and the file is
    /// not stale; otherwise reclaims it.
    pub fn acquire(&self, daemon_id: &str) -> Result<DaemonLockGuard, LockError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if let Some(existing) = self.read_existing() {
            let alive = pid_is_alive(existing.pid);
            let stale = self.is_stale();
            if alive && !stale {
                return Err(LockError::LockHeld { pid: existing.pid, daemon_id: existing.daemon_id });
            }
            tracing::warn!(
                pid = existing.pid,
                daemon_id = %existing.daemon_id,
                "reclaiming stale daemon lock"
            );
        }

        let token = nanoid::nanoid!(16);
        let now = Utc::now();
        let contents = LockContents {
            daemon_id: daemon_id.to_string(),
            pid: std::process::id(),
            started_at: now,
            acquired_at: now,
            token: token.clone(),
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&contents)?)?;
        Ok(DaemonLockGuard { path: self.path.clone(), token })
    }

    fn read_existing(&self) -> Option<LockContents> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn is_stale(&self) -> bool {
        let Ok(meta) = std::fs::metadata(&self.path) else { return false };
        let Ok(age) = meta.modified().and_then(|m| {
            SystemTime::now().duration_since(m).map_err(std::io::Error::other)
        }) else {
            return false;
        };
        age > Duration::from_secs(STALE_THRESHOLD_SECS)
    }
}

impl DaemonLockGuard {
    /// Releases the lock only if the on-disk file still carries this
    /// guard's token (another daemon may have reclaimed it in the
    /// meantime).
    pub fn release(self) {
        let Ok(contents) = std::fs::read_to_string(&self.path) else { return };
        let Ok(parsed) = serde_json::from_str::<LockContents>(&contents) else { return };
        if parsed.token == self.token {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
