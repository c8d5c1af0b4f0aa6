// SPDX-License-Identifier: MIT

//! Daemon registry (`daemon-registry.json`, spec §3 `DaemonRecord`, §4.A,
//! §6). One record per daemon; discovery prefers canonical, then legacy
//! paths, picking the freshest live-pid record.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic::{write_atomic, FileLock, StorageError};
use crate::paths::ControlPaths;

/// Default TTL after which a registry record is considered stale (spec
/// §3: "fresh iff now - heartbeatAt <= TTL").
pub const DEFAULT_TTL_SECS: i64 = 20;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonRecord {
    #[serde(default = "one")]
    pub version: u32,
    pub daemon_id: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    pub control_root: PathBuf,
    #[serde(default)]
    pub ralph_version: Option<String>,
    pub command: Vec<String>,
    pub cwd: PathBuf,
    pub control_file_path: PathBuf,
}

fn one() -> u32 {
    1
}

impl DaemonRecord {
    /// A record is fresh iff `now - heartbeat_at <= ttl` and its pid is
    /// still alive (spec §3).
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        (now - self.heartbeat_at).num_seconds() <= ttl_secs && pid_is_alive(self.pid)
    }

    /// Accepted as *canonical* only if it carries `control_root` +
    /// `heartbeat_at` (spec §6) — both are non-optional on this struct, so
    /// any record that deserializes at all satisfies this; the check exists
    /// to document the invariant for legacy-shape callers that construct a
    /// record by hand from an older schema.
    pub fn has_canonical_shape(&self) -> bool {
        !self.control_root.as_os_str().is_empty()
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

/// Read/write/heartbeat access to the daemon registry.
pub struct DaemonRegistryStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl DaemonRegistryStore {
    pub fn new(paths: &ControlPaths) -> Self {
        Self { path: paths.registry_file(), lock_path: paths.registry_lock_file() }
    }

    /// Atomically writes `record` under the registry lock (busy-wait ~2s
    /// with stale-lock reap, spec §4.A). Optionally mirrors a best-effort
    /// copy to `mirror_path` (legacy path, per spec §4.A "mirrors into
    /// legacy path if requested"); mirror failures never fail the call.
    pub fn write(&self, record: &DaemonRecord, mirror_path: Option<&std::path::Path>) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(record)?;
        let lock = FileLock::new(self.lock_path.clone());
        lock.with_lock(|| write_atomic(&self.path, &json))?;
        if let Some(mirror) = mirror_path {
            if let Err(e) = write_atomic(mirror, &json) {
                tracing::warn!(path = %mirror.display(), error = %e, "failed to mirror daemon record to legacy path");
            }
        }
        Ok(())
    }

    /// Updates only `heartbeat_at` under the registry lock.
    pub fn touch_heartbeat(&self, now: DateTime<Utc>) -> Result<(), StorageError> {
        let lock = FileLock::new(self.lock_path.clone());
        lock.with_lock(|| {
            let mut record = match std::fs::read_to_string(&self.path) {
                Ok(contents) => serde_json::from_str::<DaemonRecord>(&contents).ok(),
                Err(_) => None,
            };
            let Some(record) = record.as_mut() else {
                return Ok(());
            };
            record.heartbeat_at = now;
            let json = serde_json::to_vec_pretty(record)?;
            write_atomic(&self.path, &json)
        })
    }

    /// Reads this store's own canonical record, returning `None` on any
    /// parse error or schema mismatch (spec §4.A failure model).
    pub fn read(&self) -> Option<DaemonRecord> {
        read_record_file(&self.path)
    }
}

fn read_record_file(path: &std::path::Path) -> Option<DaemonRecord> {
    if is_unsafe_path(path) {
        return None;
    }
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str::<DaemonRecord>(&contents).ok()
}

/// Rejects a path whose parent directory is a symlink, or that is itself a
/// non-regular file (spec §4.A: "dir-that-is-a-symlink or non-regular file
/// is rejected as unsafe").
fn is_unsafe_path(path: &std::path::Path) -> bool {
    if let Some(parent) = path.parent() {
        if let Ok(meta) = std::fs::symlink_metadata(parent) {
            if meta.file_type().is_symlink() {
                return true;
            }
        }
    }
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        return !meta.file_type().is_file();
    }
    false
}

/// Scans the canonical root plus every legacy candidate and returns the
/// freshest record with a live pid, falling back to the latest record among
/// all (even dead-pid) candidates if none are alive (spec §4.A discovery).
pub fn discover(canonical: &ControlPaths) -> Option<DaemonRecord> {
    let mut candidates = Vec::new();
    if let Some(rec) = read_record_file(&canonical.registry_file()) {
        candidates.push(rec);
    }
    for legacy_root in ControlPaths::legacy_candidates() {
        let legacy = ControlPaths::new(legacy_root);
        if let Some(rec) = read_record_file(&legacy.registry_file()) {
            candidates.push(rec);
        }
    }

    let now = Utc::now();
    if let Some(best) = candidates
        .iter()
        .filter(|r| r.is_fresh(now, DEFAULT_TTL_SECS))
        .max_by_key(|r| r.heartbeat_at)
    {
        return Some(best.clone());
    }
    candidates.into_iter().max_by_key(|r| r.heartbeat_at)
}

pub fn now_epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
