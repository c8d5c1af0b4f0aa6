// SPDX-License-Identifier: MIT

//! Daemon lifecycle: singleton lock acquisition, registry heartbeat,
//! startup orphan reconciliation, and graceful shutdown (spec §4.A, §4.C,
//! §6).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ralph_core::TaskStatus;
use ralph_storage::{
    ControlPaths, ControlStatePatch, ControlStateStore, DaemonLock, DaemonLockGuard, DaemonRecord,
    DaemonRegistryStore, LockError, Mode, StorageError, TaskQueueStore,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another ralphd instance is already running: {0}")]
    AlreadyRunning(#[from] LockError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to create control-plane directory {path}: {source}")]
    Io { path: std::path::PathBuf, source: std::io::Error },
}

/// Everything that must outlive the daemon's dispatch loop and be torn down
/// in order on shutdown (spec §9 "no process-wide singletons" — one
/// instance per daemon lifetime, not per task).
pub struct DaemonState {
    pub paths: ControlPaths,
    pub daemon_id: String,
    lock: Option<DaemonLockGuard>,
    pub registry: DaemonRegistryStore,
    pub control: Arc<ControlStateStore>,
    pub queue: Arc<TaskQueueStore>,
}

impl DaemonState {
    /// Acquires the singleton lock and writes the initial registry record
    /// (spec §4.A `acquireDaemonLock`/`writeDaemonRecord`). Fails outright
    /// if another live, non-stale daemon already holds the lock — callers
    /// are expected to exit non-zero rather than race it.
    pub fn start(paths: ControlPaths) -> Result<Self, LifecycleError> {
        paths.ensure_dir().map_err(|source| LifecycleError::Io { path: paths.root.clone(), source })?;

        let daemon_id = format!("ralphd-{}", nanoid::nanoid!(12));
        let lock = DaemonLock::new(&paths).acquire(&daemon_id)?;

        let registry = DaemonRegistryStore::new(&paths);
        let now = Utc::now();
        let record = DaemonRecord {
            version: 1,
            daemon_id: daemon_id.clone(),
            pid: std::process::id(),
            started_at: now,
            heartbeat_at: now,
            control_root: paths.root.clone(),
            ralph_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            command: std::env::args().collect(),
            cwd: std::env::current_dir().unwrap_or_default(),
            control_file_path: paths.control_file(),
        };
        registry.write(&record, None)?;

        let control = Arc::new(ControlStateStore::new(&paths));
        let queue = Arc::new(TaskQueueStore::new(&paths));

        Ok(Self { paths, daemon_id, lock: Some(lock), registry, control, queue })
    }

    /// Touches the registry heartbeat (spec §3 `heartbeatAt`), called on
    /// `env::heartbeat_interval()`.
    pub fn heartbeat(&self) -> Result<(), LifecycleError> {
        self.registry.touch_heartbeat(Utc::now())?;
        Ok(())
    }

    /// Re-queues any task left `starting`/`in-progress` by a prior daemon
    /// instance that died without reaching a terminal or parked state. No
    /// in-process worker survives a restart, so the only safe move is a
    /// fresh dispatch: route through `throttled` with an elapsed
    /// `resume_at` (the only state the transition table allows back into
    /// `queued`) rather than inventing a direct `starting`/`in-progress` ->
    /// `queued` edge. A re-queued task re-enters the pipeline from Setup,
    /// which already detects and blocks on a leftover dirty worktree, so
    /// this never silently discards a partially-applied edit.
    pub fn reconcile_orphans(&self) -> Result<usize, LifecycleError> {
        for task in self.queue.by_status(TaskStatus::Starting) {
            self.queue.update_status(&task.path, TaskStatus::InProgress, |_| {})?;
        }

        let now_ms = ralph_storage::registry::now_epoch_ms();
        let mut reconciled = 0;
        for task in self.queue.by_status(TaskStatus::InProgress) {
            let moved = self.queue.update_status(&task.path, TaskStatus::Throttled, |t| {
                t.resume_at = Some(now_ms);
                t.clear_exit_fields();
            })?;
            if moved {
                tracing::warn!(task = %task.path, "requeuing orphaned task left in-flight by a prior daemon instance");
                reconciled += 1;
            }
        }
        Ok(reconciled)
    }

    /// Flips `control.json` to `draining`, waits up to `timeout` for
    /// `still_in_flight` to report zero, then releases the singleton lock
    /// (spec §4.C drain semantics, §6 "graceful drain then stop").
    pub async fn shutdown(mut self, timeout: Duration, still_in_flight: impl Fn() -> usize) {
        let _ = self.control.update(ControlStatePatch { mode: Some(Mode::Draining), ..Default::default() });

        let deadline = tokio::time::Instant::now() + timeout;
        while still_in_flight() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        if still_in_flight() > 0 {
            tracing::warn!("shutdown drain timed out with tasks still in flight");
        }

        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
