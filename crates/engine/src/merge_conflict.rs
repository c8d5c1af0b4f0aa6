// SPDX-License-Identifier: MIT

//! Merge-conflict recovery (spec §4.I-MC). The lease itself lives in
//! [`ralph_storage::ConflictLeaseStore`]; this module holds the pure
//! decision functions around it — the status-comment body, the
//! wait-condition the worker polls on, and the attempt-exhaustion check.

use ralph_adapters::{CheckRun, MergeStateStatus};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const CONFLICT_WAIT_TIMEOUT_MS: u64 = 10 * 60_000;

pub const CONFLICT_COMMENT_MARKER: &str = "<!-- ralph:merge-conflict-status -->";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictRecoveryStatus {
    Resolving,
    Resolved,
    Escalated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictStatusState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: ConflictRecoveryStatus,
}

/// Renders the upsertable "merge conflict status" comment body: a marker
/// line (so the worker can find and replace its own prior comment) plus a
/// machine-readable JSON block.
pub fn format_conflict_status_comment(state: &ConflictStatusState) -> String {
    let json = serde_json::to_string(state).unwrap_or_else(|_| "{}".to_string());
    format!("{CONFLICT_COMMENT_MARKER}\n```json\n{json}\n```\n")
}

/// Whether `body` is a prior status comment this worker should replace.
pub fn is_conflict_status_comment(body: &str) -> bool {
    body.contains(CONFLICT_COMMENT_MARKER)
}

/// The condition the worker polls for after spawning a conflict-resolution
/// session (spec §4.I-MC): head SHA moved, mergeability is no longer dirty,
/// and every required check has reported something other than unknown.
pub fn conflict_wait_satisfied(
    head_sha_before: &str,
    head_sha_now: &str,
    merge_state_status: MergeStateStatus,
    required: &[String],
    checks: &[CheckRun],
) -> bool {
    if head_sha_now == head_sha_before {
        return false;
    }
    if merge_state_status == MergeStateStatus::Dirty {
        return false;
    }
    required.iter().all(|context| {
        checks.iter().any(|c| &c.name == context && c.raw_state != "unknown")
    })
}

pub fn attempts_exhausted(attempt: u32, max_attempts: u32) -> bool {
    attempt >= max_attempts
}

/// Structured escalation summary emitted on exhaustion (spec §4.I-MC "clear
/// labels and escalate with a structured summary").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEscalationSummary {
    pub repo: String,
    pub issue_number: u64,
    pub attempts_made: u32,
    pub last_head_sha: String,
    pub last_merge_state_status: MergeStateStatus,
}

#[cfg(test)]
#[path = "merge_conflict_tests.rs"]
mod tests;
