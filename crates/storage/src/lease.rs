// SPDX-License-Identifier: MIT

//! PR-create lease table (spec §3 `PrCreateLease`, §4.H).
//!
//! At-most-one concurrent PR creation per `(repo, issueNumber, baseBranch)`.
//! The scope string is constant (`"pr-create"`) — kept in the key only for
//! parity with spec §4.H's description; this table has no other scopes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic::{write_atomic, FileLock, StorageError};
use crate::paths::ControlPaths;

pub const SCOPE: &str = "pr-create";
pub const LEASE_TTL_SECS: i64 = 20 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrCreateLease {
    pub repo: String,
    pub issue_number: u64,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
    pub holder: String,
}

impl PrCreateLease {
    pub fn key(repo: &str, issue_number: u64, base_branch: &str) -> String {
        format!("{SCOPE}:{repo}#{issue_number}@{base_branch}")
    }
}

/// Outcome of [`PrCreateLeaseStore::try_claim`].
#[derive(Debug, Clone)]
pub struct LeaseClaim {
    pub key: String,
    pub claimed: bool,
    pub stale_deleted: bool,
    pub existing_created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LeaseDocument {
    #[serde(default)]
    leases: BTreeMap<String, PrCreateLease>,
}

pub struct PrCreateLeaseStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl PrCreateLeaseStore {
    pub fn new(paths: &ControlPaths) -> Self {
        Self { path: paths.pr_create_lease_file(), lock_path: paths.root.join("pr-create-leases.lock") }
    }

    fn read_doc(&self) -> LeaseDocument {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn write_doc(&self, doc: &LeaseDocument) -> Result<(), StorageError> {
        write_atomic(&self.path, &serde_json::to_vec_pretty(doc)?)
    }

    /// Claims `(repo, issue_number, base_branch)` for `worker_identity`.
    /// Reclaims (and reports `stale_deleted = true`) an expired lease before
    /// claiming. `claimed = false` with `existing_created_at` set means
    /// another worker genuinely holds it (spec §4.H, §8 scenario 6).
    pub fn try_claim(
        &self,
        repo: &str,
        issue_number: u64,
        base_branch: &str,
        worker_identity: &str,
        now: DateTime<Utc>,
    ) -> Result<LeaseClaim, StorageError> {
        let key = PrCreateLease::key(repo, issue_number, base_branch);
        let lock = FileLock::new(self.lock_path.clone());
        lock.with_lock(|| {
            let mut doc = self.read_doc();
            let mut stale_deleted = false;

            if let Some(existing) = doc.leases.get(&key) {
                let age_secs = (now - existing.created_at).num_seconds();
                if age_secs > LEASE_TTL_SECS {
                    doc.leases.remove(&key);
                    stale_deleted = true;
                } else {
                    return Ok(LeaseClaim {
                        key,
                        claimed: false,
                        stale_deleted: false,
                        existing_created_at: Some(existing.created_at),
                    });
                }
            }

            doc.leases.insert(
                key.clone(),
                PrCreateLease {
                    repo: repo.to_string(),
                    issue_number,
                    base_branch: base_branch.to_string(),
                    created_at: now,
                    holder: worker_identity.to_string(),
                },
            );
            self.write_doc(&doc)?;
            Ok(LeaseClaim { key, claimed: true, stale_deleted, existing_created_at: None })
        })
    }

    pub fn release(&self, repo: &str, issue_number: u64, base_branch: &str) -> Result<(), StorageError> {
        let key = PrCreateLease::key(repo, issue_number, base_branch);
        let lock = FileLock::new(self.lock_path.clone());
        lock.with_lock(|| {
            let mut doc = self.read_doc();
            doc.leases.remove(&key);
            self.write_doc(&doc)
        })
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
