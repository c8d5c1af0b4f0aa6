// SPDX-License-Identifier: MIT

//! Issue-failure circuit breaker (spec §3 `CircuitBreakerState`, §4.G).

use std::collections::HashMap;

use crate::jitter::deterministic_jitter_ms;

/// Collapses a raw failure reason into a normalized, bucketable string
/// (spec §3): lowercase, URLs -> `<url>`, long hex runs -> `<hex>`, digit
/// runs -> `<n>`, whitespace collapsed.
pub fn normalize_reason(reason: &str) -> String {
    let lower = reason.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut chars = lower.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            if !out.ends_with(' ') && !out.is_empty() {
                out.push(' ');
            }
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            continue;
        }

        if (c == 'h' || c == 'H') && matches_url_scheme(&lower, &mut chars, c) {
            out.push_str("<url>");
            continue;
        }

        if c.is_ascii_hexdigit() {
            let mut run = String::new();
            run.push(c);
            while chars.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                run.push(chars.next().unwrap());
            }
            if run.len() >= 8 {
                out.push_str("<hex>");
            } else if run.chars().all(|c| c.is_ascii_digit()) {
                out.push_str("<n>");
            } else {
                out.push_str(&run);
            }
            continue;
        }

        out.push(c);
    }

    out.trim().to_string()
}

/// Peeks ahead from an already-consumed leading `h` to see whether this is
/// the start of `http://` or `https://`. Consumes the scheme + `://` on
/// match; on mismatch the peeked characters are simply not consumed (the
/// caller falls through to normal per-char handling via the caller's own
/// iterator position, which is unaffected since `peekable` only look-ahead
/// without commit here is approximated by re-scanning the static prefix).
fn matches_url_scheme(
    full: &str,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    first: char,
) -> bool {
    let _ = full;
    let rest: String = chars.clone().collect();
    let candidate = format!("{first}{rest}");
    for scheme in ["http://", "https://"] {
        if candidate.starts_with(scheme) {
            let take = scheme.len() - 1; // `first` already consumed
            for _ in 0..take {
                chars.next();
            }
            while chars.peek().is_some_and(|c| !c.is_whitespace()) {
                chars.next();
            }
            return true;
        }
    }
    false
}

/// Derives the circuit breaker's bucketing fingerprint from a raw reason.
pub fn fingerprint(reason: &str) -> String {
    normalize_reason(reason)
}

/// Tunable parameters for [`IssueCircuitBreaker`], all env-overridable per
/// spec §4.G.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub window_ms: u64,
    pub open_after: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_ms: 10 * 60_000,
            open_after: 4,
            backoff_base_ms: 15_000,
            backoff_cap_ms: 5 * 60_000,
            jitter_max_ms: 5_000,
        }
    }
}

/// Outcome of [`IssueCircuitBreaker::record_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    /// Proceed with the original terminal transition.
    None,
    /// Throttle instead of the usual terminal transition.
    Backoff {
        delay_ms: u64,
        resume_at_ms: u64,
        count: u32,
        /// True if this issue/fingerprint had already tripped `open` before
        /// this failure (i.e. this is a post-escalation repeat failure).
        opened: bool,
    },
    /// Escalate regardless of the original outcome. Fires exactly once per
    /// fingerprint per window; subsequent failures within the same open
    /// window degrade to `Backoff { opened: true, .. }`.
    Open { count: u32 },
}

#[derive(Debug, Default)]
struct FingerprintState {
    failures: Vec<u64>,
    opened: bool,
}

/// Per-`(repo, issueNumber, fingerprint)` repeat-failure damper.
///
/// Owned by one component instance (the worker's engine-level state, per
/// spec §9 — no process-wide singleton). Pure in-memory bookkeeping; the
/// caller is responsible for any durable mirroring.
#[derive(Debug, Default)]
pub struct IssueCircuitBreaker {
    config: CircuitBreakerConfig,
    state: HashMap<(String, u64, String), FingerprintState>,
}

impl IssueCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config, state: HashMap::new() }
    }

    pub fn record_failure(
        &mut self,
        repo: &str,
        issue_number: u64,
        reason: &str,
        now_ms: u64,
    ) -> CircuitDecision {
        let fp = fingerprint(reason);
        let key = (repo.to_string(), issue_number, fp.clone());
        let cfg = self.config;
        let entry = self.state.entry(key).or_default();

        let window_start = now_ms.saturating_sub(cfg.window_ms);
        entry.failures.retain(|t| *t > window_start);
        if entry.failures.is_empty() {
            entry.opened = false;
        }
        entry.failures.push(now_ms);
        let count = entry.failures.len() as u32;

        if count < 2 {
            return CircuitDecision::None;
        }

        let seed = format!("{repo}|{issue_number}|{fp}|{count}");
        let delay_ms = backoff_delay_ms(count, cfg.backoff_base_ms, cfg.backoff_cap_ms)
            + deterministic_jitter_ms(&seed, cfg.jitter_max_ms);
        let resume_at_ms = now_ms + delay_ms;

        if count >= cfg.open_after {
            if entry.opened {
                return CircuitDecision::Backoff { delay_ms, resume_at_ms, count, opened: true };
            }
            entry.opened = true;
            return CircuitDecision::Open { count };
        }

        CircuitDecision::Backoff { delay_ms, resume_at_ms, count, opened: false }
    }

    /// Wipes all fingerprints for an issue. The worker must call this on the
    /// first `success` after prior failures (§4.G).
    pub fn clear_issue(&mut self, repo: &str, issue_number: u64) {
        self.state.retain(|(r, n, _), _| !(r == repo && *n == issue_number));
    }
}

/// `base * 2^(count-2)` clamped to `cap`, valid for `count >= 2`.
pub fn backoff_delay_ms(count: u32, base_ms: u64, cap_ms: u64) -> u64 {
    if count < 2 {
        return 0;
    }
    let exp = count - 2;
    let scaled = base_ms.saturating_mul(1u64.checked_shl(exp).unwrap_or(u64::MAX));
    scaled.min(cap_ms)
}

#[cfg(test)]
#[path = "circuit_tests.rs"]
mod tests;
