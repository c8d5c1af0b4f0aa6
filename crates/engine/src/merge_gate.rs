// SPDX-License-Identifier: MIT

//! Merge Gate (spec §4.I): required-check resolution, branch-protection
//! ensure, the base-branch merge policy predicate, and classifying a poll
//! of required checks / a merge attempt outcome. The merge-conflict and
//! CI-failure remediation loops live in [`crate::ci_triage`] and
//! [`crate::merge_conflict`]; this module is the "happy path" gate plus
//! the shared resolver state those loops also consult.

use std::collections::HashMap;
use std::sync::Mutex;

use ralph_adapters::{BranchProtection, CheckRun, HostClient, HostError, PullRequest};

use crate::logging::RateLimitedLogger;

pub const REQUIRED_CHECKS_DEFER_RETRY_MS: u64 = 60_000;
pub const REQUIRED_CHECKS_MAX_POLL_MS: u64 = 10 * 60_000;

/// Where the merge gate's required-check contexts come from (spec §4.I
/// step 1 precedence): config override wins outright; otherwise branch
/// protection of the bot branch, then the default branch, then empty.
#[derive(Debug, Clone, Default)]
pub struct RequiredChecksConfig {
    pub override_contexts: Option<Vec<String>>,
    pub bot_branch: String,
    pub default_branch: String,
}

/// Resolves and memoizes the required-check context list per repo for the
/// lifetime of one worker (spec §4.I step 1: "Result memoized per worker
/// lifetime").
#[derive(Default)]
pub struct RequiredChecksResolver {
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl RequiredChecksResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(
        &self,
        host: &impl HostClient,
        repo: &str,
        config: &RequiredChecksConfig,
    ) -> Result<Vec<String>, HostError> {
        if let Some(cached) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(repo) {
            return Ok(cached.clone());
        }

        let resolved = if let Some(overridden) = &config.override_contexts {
            overridden.clone()
        } else {
            let bot = host.get_branch_protection(repo, &config.bot_branch).await;
            match bot {
                Ok(protection) if !protection.required_status_checks.is_empty() => {
                    protection.required_status_checks
                }
                _ => match host.get_branch_protection(repo, &config.default_branch).await {
                    Ok(protection) => protection.required_status_checks,
                    Err(_) => Vec::new(),
                },
            }
        };

        self.cache.lock().unwrap_or_else(|e| e.into_inner()).insert(repo.to_string(), resolved.clone());
        Ok(resolved)
    }
}

/// `required - available` (spec §4.I step 2).
pub fn missing_contexts(required: &[String], available: &[String]) -> Vec<String> {
    required.iter().filter(|r| !available.contains(r)).cloned().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchProtectionOutcome {
    /// Missing contexts aren't reported by the bot branch yet; retry later.
    Deferred { missing: Vec<String> },
    Applied,
    /// No override configured and nothing missing to reconcile.
    NoOp,
}

/// Ensures the bot branch's protection covers the required contexts (spec
/// §4.I step 2). Only acts when an override is configured; with no
/// override there's nothing this worker should push onto the branch.
pub async fn ensure_branch_protection(
    host: &impl HostClient,
    repo: &str,
    bot_branch: &str,
    required: &[String],
    logger: &RateLimitedLogger,
) -> Result<BranchProtectionOutcome, HostError> {
    if required.is_empty() {
        return Ok(BranchProtectionOutcome::NoOp);
    }

    let current = host.get_branch_protection(repo, bot_branch).await.unwrap_or_default();
    let missing = missing_contexts(required, &current.required_status_checks);
    if !missing.is_empty() {
        logger.log_bounded(&format!("branch-protection-defer:{repo}:{bot_branch}"), || {
            tracing::warn!(repo, bot_branch, ?missing, "required checks missing from bot branch, deferring");
        });
        return Ok(BranchProtectionOutcome::Deferred { missing });
    }

    let payload = BranchProtection {
        required_status_checks: required.to_vec(),
        strict: true,
        enforce_admins: true,
    };
    host.put_branch_protection(repo, bot_branch, &payload).await?;
    Ok(BranchProtectionOutcome::Applied)
}

/// Base-branch merge policy predicate (spec §4.I step 3): a PR targeting a
/// branch other than the bot branch may only merge if that base is *not*
/// the default branch, or an explicit override label is present.
pub fn merge_into_base_allowed(
    base_branch: &str,
    bot_branch: &str,
    default_branch: &str,
    labels: &[String],
    override_label: &str,
) -> bool {
    if base_branch == bot_branch {
        return true;
    }
    if base_branch != default_branch {
        return true;
    }
    labels.iter().any(|l| l == override_label)
}

/// Aggregate status of a PR's required checks (spec §4.I step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredChecksStatus {
    AllSuccess,
    Pending,
    Failed(Vec<CheckRun>),
}

/// Classifies `checks` against `required` contexts. A required context
/// absent from `checks` entirely counts as pending (not yet reported).
pub fn classify_required_checks(required: &[String], checks: &[CheckRun]) -> RequiredChecksStatus {
    if required.is_empty() {
        return RequiredChecksStatus::AllSuccess;
    }

    let mut failed = Vec::new();
    let mut pending = false;
    for context in required {
        match checks.iter().find(|c| &c.name == context) {
            None => pending = true,
            Some(check) => match check.raw_state.as_str() {
                "success" => {}
                "failure" | "error" | "cancelled" | "timed_out" => failed.push(check.clone()),
                _ => pending = true,
            },
        }
    }

    if !failed.is_empty() {
        RequiredChecksStatus::Failed(failed)
    } else if pending {
        RequiredChecksStatus::Pending
    } else {
        RequiredChecksStatus::AllSuccess
    }
}

/// Outcome of one merge attempt (spec §4.I step 4 retry rules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAttemptOutcome {
    Merged,
    /// Transient — "base branch modified" / "required checks expected" —
    /// worth a bounded retry.
    RetryableConflict,
    /// `BEHIND` mergeable state: needs a branch update before retrying.
    Behind,
    Failed(String),
}

pub fn classify_merge_error(error: &HostError) -> MergeAttemptOutcome {
    let msg = error.message.to_lowercase();
    if error.kind == ralph_adapters::HostErrorKind::Conflict
        && (msg.contains("base branch was modified") || msg.contains("required status checks"))
    {
        return MergeAttemptOutcome::RetryableConflict;
    }
    MergeAttemptOutcome::Failed(error.message.clone())
}

/// Whether the PR's head branch is safe to delete post-merge (spec §4.I
/// step 5: "only if the branch still points at the merged SHA").
pub fn head_branch_still_at_merged_sha(pr: &PullRequest, merged_head_sha: &str, current_ref_sha: &str) -> bool {
    pr.head_sha == merged_head_sha && current_ref_sha == merged_head_sha
}

#[cfg(test)]
#[path = "merge_gate_tests.rs"]
mod tests;
