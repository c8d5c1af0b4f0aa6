// SPDX-License-Identifier: MIT

//! Task identity and the per-issue pipeline status machine (spec §3, §4.D).

use serde::{Deserialize, Serialize};

/// Status of a task as it moves through the pipeline.
///
/// Allowed transitions (enforced by [`allowed_transition`], not by this type
/// alone — the queue adapter is the sole authority per §4.D):
///
/// ```text
/// queued → starting → in-progress → { done | throttled | blocked | escalated }
/// in-progress → waiting-on-pr
/// throttled → queued
/// blocked → queued
/// escalated → queued
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Queued,
    Starting,
    InProgress,
    Throttled,
    Blocked,
    WaitingOnPr,
    Escalated,
    Done,
}

crate::simple_display! {
    TaskStatus {
        Queued => "queued",
        Starting => "starting",
        InProgress => "in-progress",
        Throttled => "throttled",
        Blocked => "blocked",
        WaitingOnPr => "waiting-on-pr",
        Escalated => "escalated",
        Done => "done",
    }
}

impl TaskStatus {
    pub fn is_terminal_for_run(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::WaitingOnPr)
    }
}

/// Returns whether the queue may move a task directly from `from` to `to`.
///
/// This is the single source of truth for §4.D's transition table; every
/// queue write path must consult it before persisting a status change.
pub fn allowed_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (from, to),
        (Queued, Starting)
            | (Starting, InProgress)
            | (InProgress, Done)
            | (InProgress, Throttled)
            | (InProgress, Blocked)
            | (InProgress, Escalated)
            | (InProgress, WaitingOnPr)
            | (Throttled, Queued)
            | (Blocked, Queued)
            | (Escalated, Queued)
    )
}

/// Ordered dispatch priority. Higher variants are scheduled first within the
/// priority (resume) pass of §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    #[default]
    Normal,
    Low,
    High,
}

/// Reason tag attached to a `blocked` task (§7 "Blocked" error class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockedSource {
    SetupFailed,
    DirtyRepo,
    Allowlist,
    Classifier,
    Stall,
}

crate::simple_display! {
    BlockedSource {
        SetupFailed => "setup-failed",
        DirtyRepo => "dirty-repo",
        Allowlist => "allowlist",
        Classifier => "classifier",
        Stall => "stall",
    }
}

/// One unit of work scoped to a single upstream issue.
///
/// `path` is the unique queue key. Fields marked optional are absent unless
/// the invariant noted on them holds: `session_id` is non-empty whenever
/// `status = InProgress`; `worktree_path` is set iff the task currently owns
/// a worktree; `resume_at` is set iff `status = Throttled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub path: String,
    pub repo: String,
    pub issue_ref: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_slot: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttled_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_source: Option<BlockedSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_detail: Option<String>,

    #[serde(default)]
    pub watchdog_retries: u32,
    #[serde(default)]
    pub stall_retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_log_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at_checkpoint: Option<crate::checkpoint::PipelineCheckpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_snapshot: Option<serde_json::Value>,
}

impl Task {
    pub fn new(path: impl Into<String>, repo: impl Into<String>, issue_ref: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            repo: repo.into(),
            issue_ref: issue_ref.into(),
            status: TaskStatus::Queued,
            priority: Priority::default(),
            session_id: None,
            worktree_path: None,
            worker_id: None,
            repo_slot: None,
            assigned_at: None,
            completed_at: None,
            throttled_at: None,
            resume_at: None,
            heartbeat_at: None,
            blocked_source: None,
            blocked_at: None,
            blocked_detail: None,
            watchdog_retries: 0,
            stall_retries: 0,
            run_log_path: None,
            paused_at_checkpoint: None,
            usage_snapshot: None,
        }
    }

    /// Exit-fields policy on entering `done` (§4.D): clear session/worktree/
    /// worker/slot, watchdog-retries, and all blocked-* fields.
    pub fn clear_exit_fields(&mut self) {
        self.session_id = None;
        self.worktree_path = None;
        self.worker_id = None;
        self.repo_slot = None;
        self.watchdog_retries = 0;
        self.blocked_source = None;
        self.blocked_at = None;
        self.blocked_detail = None;
    }

    /// Whether this task satisfies the "in-progress sessions are non-empty"
    /// invariant. Used by invariant-checking tests, not by hot-path code.
    pub fn satisfies_session_invariant(&self) -> bool {
        if self.status == TaskStatus::InProgress {
            return self.session_id.as_deref().is_some_and(|s| !s.is_empty());
        }
        true
    }

    pub fn satisfies_worktree_invariant(&self) -> bool {
        self.worktree_path.is_some() || self.status != TaskStatus::InProgress
    }

    pub fn satisfies_resume_at_invariant(&self) -> bool {
        (self.status == TaskStatus::Throttled) == self.resume_at.is_some()
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            path: String = "repo-a/1",
            repo: String = "owner/repo-a",
            issue_ref: String = "owner/repo-a#1",
        }
        set {
            status: TaskStatus = TaskStatus::Queued,
            priority: Priority = Priority::Normal,
            watchdog_retries: u32 = 0,
            stall_retries: u32 = 0,
        }
        option {
            session_id: String = None,
            worktree_path: String = None,
            worker_id: String = None,
            repo_slot: String = None,
            assigned_at: u64 = None,
            completed_at: u64 = None,
            throttled_at: u64 = None,
            resume_at: u64 = None,
            heartbeat_at: u64 = None,
            blocked_source: BlockedSource = None,
            blocked_at: u64 = None,
            blocked_detail: String = None,
            run_log_path: String = None,
            paused_at_checkpoint: crate::checkpoint::PipelineCheckpoint = None,
            usage_snapshot: serde_json::Value = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
