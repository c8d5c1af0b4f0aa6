// SPDX-License-Identifier: MIT

//! PR-create lease acquisition at the worker level (spec §4.E step 7,
//! §4.H). Wraps [`ralph_storage::PrCreateLeaseStore`]'s instantaneous
//! `try_claim` with the worker's wait-for-existing-PR behavior: on a
//! conflicting claim, poll for a PR the other worker is creating for up to
//! two minutes before giving up and throttling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use ralph_adapters::PullRequest;
use ralph_storage::{LeaseClaim, PrCreateLeaseStore, StorageError};

pub const LEASE_WAIT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const LEASE_WAIT_TIMEOUT: Duration = Duration::from_secs(2 * 60);
pub const LEASE_CONFLICT_THROTTLE_MS: u64 = 5 * 60_000;

/// Outcome of attempting to acquire the PR-create lease for one task (spec
/// §4.E step 7).
#[derive(Debug, Clone)]
pub enum PrLeaseOutcome {
    /// This worker now holds the lease and may proceed to create the PR.
    Claimed,
    /// Another worker was already creating the PR and it showed up while
    /// waiting; use it instead of creating a duplicate.
    FoundExisting(PullRequest),
    /// Another worker holds the lease and no PR appeared within the wait
    /// window; throttle this task instead of spinning.
    ThrottleResume { resume_at_ms: u64 },
}

/// Acquires the PR-create lease, waiting out a conflicting claim by polling
/// `find_existing` every [`LEASE_WAIT_POLL_INTERVAL`] up to
/// [`LEASE_WAIT_TIMEOUT`] (spec §4.E step 7: "on conflict wait up to 2min
/// for an existing PR, else transition throttled with a 5min resume").
pub async fn acquire_pr_lease<F, Fut>(
    store: &PrCreateLeaseStore,
    repo: &str,
    issue_number: u64,
    base_branch: &str,
    worker_identity: &str,
    now: DateTime<Utc>,
    now_ms: u64,
    mut find_existing: F,
) -> Result<PrLeaseOutcome, StorageError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<PullRequest>>,
{
    let claim: LeaseClaim = store.try_claim(repo, issue_number, base_branch, worker_identity, now)?;
    if claim.claimed {
        return Ok(PrLeaseOutcome::Claimed);
    }

    let deadline = tokio::time::Instant::now() + LEASE_WAIT_TIMEOUT;
    loop {
        if let Some(pr) = find_existing().await {
            return Ok(PrLeaseOutcome::FoundExisting(pr));
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(PrLeaseOutcome::ThrottleResume { resume_at_ms: now_ms + LEASE_CONFLICT_THROTTLE_MS });
        }
        tokio::time::sleep(LEASE_WAIT_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
#[path = "pr_lease_tests.rs"]
mod tests;
