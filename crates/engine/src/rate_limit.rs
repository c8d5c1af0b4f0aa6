// SPDX-License-Identifier: MIT

//! Rate-Limit Pause (spec §4.J). Converts a host rate-limit error into a
//! deterministic throttled-state transition: `resume_at` monotonically
//! advances (spec §8), and the jitter term is keyed on a stable seed so
//! tests can assert exact timestamps (spec §9).

use ralph_adapters::HostError;
use ralph_core::deterministic_jitter_ms;
use serde::{Deserialize, Serialize};

pub const MIN_BACKOFF_MS: u64 = 60_000;
pub const SAFETY_BUFFER_MS: u64 = 2_000;
pub const JITTER_MAX_MS: u64 = 5_000;
const SNAPSHOT_MESSAGE_MAX: usize = 400;

/// Bounded, secret-redacted snapshot persisted to `Task.usage_snapshot`
/// when a rate-limit error throttles a task (spec §4.J, §6 wire shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub kind: &'static str,
    pub stage: String,
    pub status: u16,
    pub request_id: Option<String>,
    pub resume_at: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitPause {
    pub resume_at_ms: u64,
    pub snapshot: RateLimitSnapshot,
}

/// Computes the new `resume_at` and snapshot for a rate-limit pause (spec
/// §4.J). `prior_resume_at_ms` is the task's current `resume-at` (0 if
/// unset); `now_ms` is wall-clock epoch millis.
///
/// `base = max(prior_resume, error_resume, now + MIN_BACKOFF)`, then add a
/// fixed `SAFETY_BUFFER`, then a deterministic jitter in `[0, 5s)` keyed on
/// `request_id || stage || "github-rate-limit"` (falls back to `stage` when
/// there's no request id).
pub fn compute_rate_limit_pause(
    error: &HostError,
    stage: &str,
    prior_resume_at_ms: u64,
    now_ms: u64,
) -> RateLimitPause {
    let error_resume_ms = error.resume_at_ts.map(|ts| ts.max(0) as u64).unwrap_or(0);
    let min_resume = now_ms + MIN_BACKOFF_MS;
    let base = prior_resume_at_ms.max(error_resume_ms).max(min_resume);

    let seed_key = error.request_id.clone().unwrap_or_else(|| stage.to_string());
    let seed = format!("{seed_key}|{stage}|github-rate-limit");
    let jitter = deterministic_jitter_ms(&seed, JITTER_MAX_MS);

    let resume_at_ms = base + SAFETY_BUFFER_MS + jitter;
    let resume_at_iso = epoch_ms_to_iso(resume_at_ms);

    RateLimitPause {
        resume_at_ms,
        snapshot: RateLimitSnapshot {
            kind: "github-rate-limit",
            stage: stage.to_string(),
            status: error.status,
            request_id: error.request_id.clone(),
            resume_at: resume_at_iso,
            message: truncate_message(&error.message),
        },
    }
}

fn truncate_message(message: &str) -> String {
    if message.chars().count() <= SNAPSHOT_MESSAGE_MAX {
        return message.to_string();
    }
    let truncated: String = message.chars().take(SNAPSHOT_MESSAGE_MAX).collect();
    format!("{truncated}...")
}

fn epoch_ms_to_iso(ms: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms as i64)
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339()
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
