// SPDX-License-Identifier: MIT

//! CI-failure triage (spec §4.I-CI): a stable failure signature, a triage
//! decision over that signature's occurrence history, and the CI-debug
//! remediation loop's per-iteration bookkeeping and termination rule.
//!
//! The exact decision function is an Open Question the spec leaves to the
//! implementation (documented in `DESIGN.md`): repeat count against the
//! signature history is the simplest stable signal available without a
//! richer classifier, so that's what this resolves to.

use ralph_adapters::CheckRun;
use ralph_core::deterministic_jitter_ms;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const QUARANTINE_HISTORY_CAP: usize = 20;
pub const REMEDIATION_BACKOFF_BASE_MS: u64 = 30_000;
pub const REMEDIATION_BACKOFF_CAP_MS: u64 = 120_000;

/// Stable v2 failure signature: sha256 of the sorted `{checkName, rawState,
/// runId}` triples, so reordering the host's check list doesn't change it.
pub fn ci_failure_signature(failed: &[CheckRun]) -> String {
    let mut rows: Vec<String> = failed.iter().map(|c| format!("{}|{}|{}", c.name, c.raw_state, c.run_id)).collect();
    rows.sort();
    let mut hasher = Sha256::new();
    for row in &rows {
        hasher.update(row.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriageClassification {
    FirstOccurrence,
    Recurring,
    Chronic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriageAction {
    Resume,
    CiDebug,
    Quarantine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageDecision {
    pub classification: TriageClassification,
    pub action: TriageAction,
    pub action_reason: String,
}

/// Decides what to do about a failure signature given its prior occurrence
/// count for this issue (spec §4.I-CI): first time through, retry inline
/// with a CI-fix prompt; a couple of repeats graduate to a dedicated
/// CI-debug worktree; three or more is chronic and gets quarantined rather
/// than burning further attempts on what's proven not self-healing.
pub fn decide_triage(prior_occurrences: usize) -> TriageDecision {
    match prior_occurrences {
        0 => TriageDecision {
            classification: TriageClassification::FirstOccurrence,
            action: TriageAction::Resume,
            action_reason: "first occurrence of this failure signature; retry inline".to_string(),
        },
        1 | 2 => TriageDecision {
            classification: TriageClassification::Recurring,
            action: TriageAction::CiDebug,
            action_reason: format!("failure signature seen {} time(s) before; escalating to CI-debug worktree", prior_occurrences),
        },
        n => TriageDecision {
            classification: TriageClassification::Chronic,
            action: TriageAction::Quarantine,
            action_reason: format!("failure signature seen {n} times; quarantining rather than retrying further"),
        },
    }
}

/// Bounded, ring-capped history of failure signatures for one issue (spec
/// §4.I-CI "occurrence history, cap 20"). Oldest entries drop first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarantineHistory {
    #[serde(default)]
    pub source_issue: String,
    #[serde(default)]
    signatures: Vec<String>,
}

impl QuarantineHistory {
    pub fn new(source_issue: impl Into<String>) -> Self {
        Self { source_issue: source_issue.into(), signatures: Vec::new() }
    }

    pub fn occurrences_of(&self, signature: &str) -> usize {
        self.signatures.iter().filter(|s| s.as_str() == signature).count()
    }

    pub fn record(&mut self, signature: &str) {
        self.signatures.push(signature.to_string());
        if self.signatures.len() > QUARANTINE_HISTORY_CAP {
            let overflow = self.signatures.len() - QUARANTINE_HISTORY_CAP;
            self.signatures.drain(0..overflow);
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// One CI-debug remediation iteration (spec §4.I-CI), recorded for the
/// escalation summary regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiRemediationAttempt {
    pub attempt: u32,
    pub head_sha_before: String,
    pub head_sha_after: Option<String>,
    pub signature_before: String,
    pub signature_after: Option<String>,
    pub run_urls: Vec<String>,
    pub status: RemediationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemediationStatus {
    InProgress,
    Success,
    NoProgress,
    MaxAttemptsReached,
}

/// Exponential backoff (base 30s, cap 120s) with deterministic jitter keyed
/// on `(repo, issue_number, attempt)` so remediation pacing is reproducible
/// in tests.
pub fn remediation_backoff_ms(repo: &str, issue_number: u64, attempt: u32) -> u64 {
    let exp = REMEDIATION_BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(8));
    let capped = exp.min(REMEDIATION_BACKOFF_CAP_MS);
    let seed = format!("{repo}#{issue_number}:ci-remediation:{attempt}");
    capped + deterministic_jitter_ms(&seed, capped / 4 + 1)
}

/// Whether a just-completed remediation attempt terminates the loop, and
/// how (spec §4.I-CI: "success, no-progress, or max attempts — each
/// escalates distinctly"). `still_failing` is the post-attempt check state.
pub fn classify_remediation_attempt(
    attempt_number: u32,
    max_attempts: u32,
    head_sha_before: &str,
    head_sha_after: &str,
    still_failing: bool,
) -> RemediationStatus {
    if !still_failing {
        return RemediationStatus::Success;
    }
    if head_sha_before == head_sha_after {
        return RemediationStatus::NoProgress;
    }
    if attempt_number >= max_attempts {
        return RemediationStatus::MaxAttemptsReached;
    }
    RemediationStatus::InProgress
}

#[cfg(test)]
#[path = "ci_triage_tests.rs"]
mod tests;
