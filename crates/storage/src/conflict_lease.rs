// SPDX-License-Identifier: MIT

//! Merge-conflict recovery lease (spec §4.I-MC). Same durable, file-locked
//! claim/TTL/reclaim shape as [`crate::lease::PrCreateLeaseStore`], scoped
//! to `(repo, issueNumber)` rather than `(repo, issueNumber, baseBranch)`
//! since only one conflict-resolution session may run per issue at a time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic::{write_atomic, FileLock, StorageError};
use crate::paths::ControlPaths;

pub const SCOPE: &str = "merge-conflict";
pub const CONFLICT_LEASE_TTL_SECS: i64 = 20 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictLease {
    pub repo: String,
    pub issue_number: u64,
    pub created_at: DateTime<Utc>,
    pub holder: String,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct ConflictLeaseClaim {
    pub claimed: bool,
    pub stale_deleted: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConflictLeaseDocument {
    #[serde(default)]
    leases: BTreeMap<String, ConflictLease>,
}

fn key(repo: &str, issue_number: u64) -> String {
    format!("{SCOPE}:{repo}#{issue_number}")
}

pub struct ConflictLeaseStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl ConflictLeaseStore {
    pub fn new(paths: &ControlPaths) -> Self {
        Self { path: paths.root.join("merge-conflict-leases.json"), lock_path: paths.root.join("merge-conflict-leases.lock") }
    }

    fn read_doc(&self) -> ConflictLeaseDocument {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn write_doc(&self, doc: &ConflictLeaseDocument) -> Result<(), StorageError> {
        write_atomic(&self.path, &serde_json::to_vec_pretty(doc)?)
    }

    pub fn try_claim(
        &self,
        repo: &str,
        issue_number: u64,
        worker_identity: &str,
        now: DateTime<Utc>,
    ) -> Result<ConflictLeaseClaim, StorageError> {
        let k = key(repo, issue_number);
        let lock = FileLock::new(self.lock_path.clone());
        lock.with_lock(|| {
            let mut doc = self.read_doc();
            let mut stale_deleted = false;

            if let Some(existing) = doc.leases.get(&k) {
                let age_secs = (now - existing.created_at).num_seconds();
                if age_secs > CONFLICT_LEASE_TTL_SECS {
                    doc.leases.remove(&k);
                    stale_deleted = true;
                } else {
                    return Ok(ConflictLeaseClaim { claimed: false, stale_deleted: false });
                }
            }

            doc.leases.insert(
                k,
                ConflictLease {
                    repo: repo.to_string(),
                    issue_number,
                    created_at: now,
                    holder: worker_identity.to_string(),
                    attempt: 1,
                },
            );
            self.write_doc(&doc)?;
            Ok(ConflictLeaseClaim { claimed: true, stale_deleted })
        })
    }

    pub fn release(&self, repo: &str, issue_number: u64) -> Result<(), StorageError> {
        let k = key(repo, issue_number);
        let lock = FileLock::new(self.lock_path.clone());
        lock.with_lock(|| {
            let mut doc = self.read_doc();
            doc.leases.remove(&k);
            self.write_doc(&doc)
        })
    }
}

#[cfg(test)]
#[path = "conflict_lease_tests.rs"]
mod tests;
