// SPDX-License-Identifier: MIT

//! `RelationshipProvider` — local-DB half of the PR Resolver's candidate
//! list (spec §4.K "Local DB candidates"; §9 Design Notes names this
//! capability bundle directly). The core never embeds a specific database;
//! it only asks this port for whatever PR URLs a prior run already
//! associated with an issue.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelationshipError {
    #[error("lookup failed: {0}")]
    LookupFailed(String),
}

/// Local-DB candidate lookup for the PR Resolver (spec §4.K step 1).
#[async_trait]
pub trait RelationshipProvider: Send + Sync + 'static {
    /// Returns PR URLs previously associated with `(repo, issue_number)`,
    /// most-recently-associated first. An empty result is not an error —
    /// it just means the resolver falls through to host search.
    async fn candidate_prs(&self, repo: &str, issue_number: u64) -> Result<Vec<String>, RelationshipError>;

    /// Records that `pr_url` is now associated with `(repo, issue_number)`,
    /// called by the resolver once it picks a canonical URL (spec §4.K:
    /// "record snapshots for the selected and duplicates").
    async fn record(&self, repo: &str, issue_number: u64, pr_url: &str) -> Result<(), RelationshipError>;
}

#[async_trait]
impl<T: RelationshipProvider + ?Sized> RelationshipProvider for std::sync::Arc<T> {
    async fn candidate_prs(&self, repo: &str, issue_number: u64) -> Result<Vec<String>, RelationshipError> {
        (**self).candidate_prs(repo, issue_number).await
    }

    async fn record(&self, repo: &str, issue_number: u64, pr_url: &str) -> Result<(), RelationshipError> {
        (**self).record(repo, issue_number, pr_url).await
    }
}

/// A `RelationshipProvider` with no local DB backing it. Every lookup
/// returns empty, so the resolver always falls through to host search —
/// a correct, if degraded, default for deployments that don't keep one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRelationshipProvider;

#[async_trait]
impl RelationshipProvider for NullRelationshipProvider {
    async fn candidate_prs(&self, _repo: &str, _issue_number: u64) -> Result<Vec<String>, RelationshipError> {
        Ok(Vec::new())
    }

    async fn record(&self, _repo: &str, _issue_number: u64, _pr_url: &str) -> Result<(), RelationshipError> {
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeRelationshipProvider {
        inner: Arc<Mutex<HashMap<(String, u64), Vec<String>>>>,
    }

    impl FakeRelationshipProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, repo: &str, issue_number: u64, pr_urls: Vec<String>) {
            self.inner.lock().insert((repo.to_string(), issue_number), pr_urls);
        }

        pub fn recorded(&self, repo: &str, issue_number: u64) -> Vec<String> {
            self.inner.lock().get(&(repo.to_string(), issue_number)).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl RelationshipProvider for FakeRelationshipProvider {
        async fn candidate_prs(&self, repo: &str, issue_number: u64) -> Result<Vec<String>, RelationshipError> {
            Ok(self.inner.lock().get(&(repo.to_string(), issue_number)).cloned().unwrap_or_default())
        }

        async fn record(&self, repo: &str, issue_number: u64, pr_url: &str) -> Result<(), RelationshipError> {
            let mut g = self.inner.lock();
            let entry = g.entry((repo.to_string(), issue_number)).or_default();
            if !entry.iter().any(|u| u == pr_url) {
                entry.insert(0, pr_url.to_string());
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRelationshipProvider;

#[cfg(test)]
#[path = "relationship_tests.rs"]
mod tests;
