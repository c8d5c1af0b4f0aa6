// SPDX-License-Identifier: MIT

//! Timeout & Recovery (spec §4.F): watchdog, stall, and loop-detection
//! decision functions. Each handler is a pure function of the task's
//! recovery counters plus observed timing/event signals; the circuit
//! breaker is consulted by the caller afterward, same as the teacher's
//! layering in `ralph_core::circuit`.

use crate::logging::RateLimitedLogger;

/// Watchdog decision (spec §4.F "Watchdog").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogDecision {
    /// Below the soft threshold; nothing to do.
    Ok,
    /// Soft threshold crossed; caller should log at a bounded rate but the
    /// session keeps running.
    SoftWarn,
    /// Hard threshold crossed and this is the first occurrence; re-queue
    /// once with `watchdog_retries` incremented.
    RetryOnce,
    /// Hard threshold crossed on a retried task, or the recent-event
    /// pattern is a repeat signature: escalate immediately.
    Escalate { reason: String },
}

/// Minimum consecutive repeats of the same tool-call name that counts as a
/// "repeat signature" worth escalating early instead of retrying (spec
/// §4.F "same tool name seen >= N times consecutively").
pub const REPEAT_SIGNATURE_THRESHOLD: usize = 3;

/// Longest consecutive run of `recent_events` sharing one name.
fn longest_consecutive_run(recent_events: &[String]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut last: Option<&str> = None;
    for event in recent_events {
        if Some(event.as_str()) == last {
            current += 1;
        } else {
            current = 1;
            last = Some(event.as_str());
        }
        longest = longest.max(current);
    }
    longest
}

/// Classifies a watchdog measurement (spec §4.F). `elapsed_ms` is wall-clock
/// since the last tool-call completion; `recent_events` are recent tool-call
/// names in order, most-recent last.
pub fn classify_watchdog(
    elapsed_ms: u64,
    soft_threshold_ms: u64,
    hard_threshold_ms: u64,
    watchdog_retries: u32,
    recent_events: &[String],
) -> WatchdogDecision {
    if elapsed_ms < soft_threshold_ms {
        return WatchdogDecision::Ok;
    }
    if elapsed_ms < hard_threshold_ms {
        return WatchdogDecision::SoftWarn;
    }

    if watchdog_retries == 0 && longest_consecutive_run(recent_events) >= REPEAT_SIGNATURE_THRESHOLD {
        return WatchdogDecision::Escalate {
            reason: "watchdog timeout with repeated tool-call signature on first occurrence".to_string(),
        };
    }
    if watchdog_retries == 0 {
        return WatchdogDecision::RetryOnce;
    }
    WatchdogDecision::Escalate { reason: "watchdog timeout after prior retry".to_string() }
}

/// Logs a soft watchdog warning at most once per `softLogIntervalMs` (spec
/// §4.F); shares the merge gate's bounded-rate logger.
pub fn log_soft_watchdog(logger: &RateLimitedLogger, task_path: &str, elapsed_ms: u64) {
    logger.log_bounded(&format!("watchdog-soft:{task_path}"), || {
        tracing::warn!(task_path, elapsed_ms, "watchdog soft threshold crossed");
    });
}

/// Stall decision (spec §4.F "Stall").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallDecision {
    Ok,
    /// First stall with a known session: nudge via re-queue, same session.
    NudgeSameSession,
    /// Second+ stall: restart with a fresh session.
    RestartFreshSession,
    Escalate { reason: String },
}

pub fn classify_stall(
    idle_ms: u64,
    stall_threshold_ms: u64,
    stall_retries: u32,
    max_restarts: u32,
    has_session_id: bool,
) -> StallDecision {
    if idle_ms < stall_threshold_ms {
        return StallDecision::Ok;
    }
    if stall_retries >= max_restarts {
        return StallDecision::Escalate { reason: format!("stall persisted past max_restarts={max_restarts}") };
    }
    if stall_retries == 0 && has_session_id {
        return StallDecision::NudgeSameSession;
    }
    StallDecision::RestartFreshSession
}

/// Loop-detection trip diagnostics (spec §4.F "Loop detection").
#[derive(Debug, Clone)]
pub struct LoopTripDiagnostics {
    pub reason: String,
    pub metrics: std::collections::HashMap<String, u64>,
    /// Top touched files, clipped to 10 — either from `metrics` or a
    /// `git diff --name-only` fallback (spec §4.F).
    pub top_touched_files: Vec<String>,
}

const MAX_TOUCHED_FILES: usize = 10;

/// Builds the escalation diagnostics for a loop-detection trip. `touched_files`
/// should already be ordered most-relevant-first (e.g. by touch count);
/// this only enforces the clip.
pub fn build_loop_trip_diagnostics(
    reason: impl Into<String>,
    metrics: std::collections::HashMap<String, u64>,
    touched_files: Vec<String>,
) -> LoopTripDiagnostics {
    let mut top_touched_files = touched_files;
    top_touched_files.truncate(MAX_TOUCHED_FILES);
    LoopTripDiagnostics { reason: reason.into(), metrics, top_touched_files }
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod tests;
