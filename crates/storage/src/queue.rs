// SPDX-License-Identifier: MIT

//! Durable task queue (spec §3 `Task`, §4.D).
//!
//! A single JSON document keyed by `path`, read-modify-written under a
//! short-TTL file lock so concurrent worker/scheduler writers never
//! interleave. The queue adapter is the sole authority for status
//! transitions (§4.D, §9): every write here re-checks
//! [`ralph_core::allowed_transition`] before persisting.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ralph_core::{allowed_transition, Task, TaskStatus};
use thiserror::Error;

use crate::atomic::{write_atomic, FileLock, StorageError};
use crate::paths::ControlPaths;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("no task at path {0:?}")]
    NotFound(String),
    #[error("illegal transition {from} -> {to} for {path:?}")]
    IllegalTransition { path: String, from: TaskStatus, to: TaskStatus },
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct QueueDocument {
    #[serde(default)]
    tasks: BTreeMap<String, Task>,
}

pub struct TaskQueueStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl TaskQueueStore {
    pub fn new(paths: &ControlPaths) -> Self {
        Self { path: paths.queue_file(), lock_path: paths.root.join("queue.lock") }
    }

    fn read_doc(&self) -> QueueDocument {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn write_doc(&self, doc: &QueueDocument) -> Result<(), StorageError> {
        write_atomic(&self.path, &serde_json::to_vec_pretty(doc)?)
    }

    /// Inserts a brand-new `queued` task. A re-insert of an already-known
    /// path is a no-op (watcher double-fire idempotence at the storage
    /// layer, spec §8 scenario 2 — the scheduler's own in-flight set
    /// handles the dispatch-level half of this).
    pub fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        let lock = FileLock::new(self.lock_path.clone());
        lock.with_lock(|| {
            let mut doc = self.read_doc();
            doc.tasks.entry(task.path.clone()).or_insert(task);
            self.write_doc(&doc)
        })?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<Task> {
        self.read_doc().tasks.get(path).cloned()
    }

    pub fn get_queued(&self) -> Vec<Task> {
        self.by_status(TaskStatus::Queued)
    }

    pub fn by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.read_doc().tasks.values().filter(|t| t.status == status).cloned().collect()
    }

    pub fn all(&self) -> Vec<Task> {
        self.read_doc().tasks.values().cloned().collect()
    }

    /// Attempts `task.status -> new_status`, applying `patch` first. Returns
    /// `true` iff the stored status actually moved to `new_status` (spec
    /// §4.D: `updateTaskStatus` "returns true iff the stored status moved to
    /// newStatus").
    pub fn update_status(
        &self,
        path: &str,
        new_status: TaskStatus,
        patch: impl FnOnce(&mut Task),
    ) -> Result<bool, QueueError> {
        let lock = FileLock::new(self.lock_path.clone());
        let moved = lock.with_lock(|| {
            let mut doc = self.read_doc();
            let Some(task) = doc.tasks.get_mut(path) else {
                return Ok(false);
            };
            let from = task.status;
            if from == new_status {
                patch(task);
                self.write_doc(&doc)?;
                return Ok(true);
            }
            if !allowed_transition(from, new_status) {
                return Ok(false);
            }
            task.status = new_status;
            patch(task);
            if new_status == TaskStatus::Done {
                task.clear_exit_fields();
            }
            self.write_doc(&doc)?;
            Ok(true)
        })?;
        Ok(moved)
    }

    /// Groups a task list by `repo`, preserving each group's relative order
    /// (spec §3 `groupByRepo`).
    pub fn group_by_repo(tasks: &[Task]) -> BTreeMap<String, Vec<Task>> {
        let mut out: BTreeMap<String, Vec<Task>> = BTreeMap::new();
        for t in tasks {
            out.entry(t.repo.clone()).or_default().push(t.clone());
        }
        out
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
