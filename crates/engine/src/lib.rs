// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ralph-engine: the orchestration kernel (spec §4 components B, C, E-K).
//! Scheduling, the drain/pause monitor, timeout/recovery, the merge gate
//! and its conflict/CI-triage remediation loops, the rate-limit pause, the
//! PR resolver, and the `RepoWorker` pipeline state machine that ties them
//! all together for one task at a time.

pub mod ci_triage;
pub mod logging;
pub mod merge_conflict;
pub mod merge_gate;
pub mod monitor;
pub mod pr_lease;
pub mod pr_resolver;
pub mod rate_limit;
pub mod scheduler;
pub mod semaphore;
pub mod timeout;
pub mod worker;

pub use ci_triage::{
    ci_failure_signature, classify_remediation_attempt, decide_triage, remediation_backoff_ms,
    CiRemediationAttempt, QuarantineHistory, RemediationStatus, TriageAction, TriageClassification,
    TriageDecision,
};
pub use logging::RateLimitedLogger;
pub use merge_conflict::{
    attempts_exhausted, conflict_wait_satisfied, format_conflict_status_comment,
    is_conflict_status_comment, ConflictEscalationSummary, ConflictRecoveryStatus, ConflictStatusState,
};
pub use merge_gate::{
    classify_merge_error, classify_required_checks, ensure_branch_protection, head_branch_still_at_merged_sha,
    merge_into_base_allowed, missing_contexts, BranchProtectionOutcome, MergeAttemptOutcome,
    RequiredChecksConfig, RequiredChecksResolver, RequiredChecksStatus,
};
pub use monitor::DrainMonitor;
pub use pr_lease::{acquire_pr_lease, PrLeaseOutcome};
pub use pr_resolver::{PrResolution, PrResolver};
pub use rate_limit::{compute_rate_limit_pause, RateLimitPause, RateLimitSnapshot};
pub use scheduler::{Debouncer, FairScheduler, Gate, RepoCapacityFn, TaskPermits};
pub use semaphore::{Cancelled, Permit, Semaphore};
pub use timeout::{
    build_loop_trip_diagnostics, classify_stall, classify_watchdog, log_soft_watchdog, LoopTripDiagnostics,
    StallDecision, WatchdogDecision,
};
pub use worker::{PipelineOutcome, RepoWorker, WorkerConfig, WorkerContext};
