// SPDX-License-Identifier: MIT

//! PR Resolver (spec §4.K). Canonical-PR selection with a short-TTL cache
//! and a `fresh` bypass. Owned by one component instance per worker
//! lifetime (spec §9 "no process-wide singletons").

use std::collections::HashMap;
use std::sync::Mutex;

use ralph_adapters::{HostClient, PullRequest, RelationshipProvider};
use ralph_core::Clock;

const DEFAULT_CACHE_TTL_MS: u64 = 30_000;

/// Where a candidate PR came from, used to break ties when DB and host
/// search disagree (spec §9 open question (i): "source picks DB-first").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CandidateSource {
    HostSearch,
    LocalDb,
}

#[derive(Debug, Clone)]
struct Candidate {
    pr: PullRequest,
    source: CandidateSource,
}

/// Resolution outcome (spec §4.K): the canonical PR plus any duplicates
/// found along the way, each recorded as a relationship for next time.
#[derive(Debug, Clone)]
pub struct PrResolution {
    pub canonical: PullRequest,
    pub duplicates: Vec<PullRequest>,
}

#[derive(Clone)]
struct CacheEntry {
    resolution: Option<PrResolutionCached>,
    cached_at_ms: u64,
}

#[derive(Clone)]
struct PrResolutionCached {
    canonical: PullRequest,
    duplicates: Vec<PullRequest>,
}

/// Canonical-PR selection for a given issue, backed by local-DB candidates
/// (spec §4.K step 1) and host search (step 2), cached for `ttl_ms` unless
/// the caller passes `fresh = true` (spec §4.K).
pub struct PrResolver<H, R, C> {
    host: H,
    relationships: R,
    clock: C,
    ttl_ms: u64,
    cache: Mutex<HashMap<(String, u64), CacheEntry>>,
}

impl<H, R, C> PrResolver<H, R, C>
where
    H: HostClient,
    R: RelationshipProvider,
    C: Clock,
{
    pub fn new(host: H, relationships: R, clock: C) -> Self {
        Self { host, relationships, clock, ttl_ms: DEFAULT_CACHE_TTL_MS, cache: Mutex::new(HashMap::new()) }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// `getIssuePrResolution` (spec §4.K). `fresh = true` bypasses and
    /// refreshes the cache.
    pub async fn resolve(&self, repo: &str, issue_number: u64, fresh: bool) -> Option<PrResolution> {
        let key = (repo.to_string(), issue_number);
        let now = self.clock.epoch_ms();

        if !fresh {
            if let Some(cached) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
                if now.saturating_sub(cached.cached_at_ms) < self.ttl_ms {
                    return cached.resolution.as_ref().map(|r| PrResolution {
                        canonical: r.canonical.clone(),
                        duplicates: r.duplicates.clone(),
                    });
                }
            }
        }

        let resolution = self.resolve_uncached(repo, issue_number).await;
        let entry = CacheEntry {
            resolution: resolution.as_ref().map(|r| PrResolutionCached {
                canonical: r.canonical.clone(),
                duplicates: r.duplicates.clone(),
            }),
            cached_at_ms: now,
        };
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).insert(key, entry);

        if let Some(resolution) = &resolution {
            let _ = self.relationships.record(repo, issue_number, &resolution.canonical.url).await;
            for dup in &resolution.duplicates {
                let _ = self.relationships.record(repo, issue_number, &dup.url).await;
            }
        }

        resolution
    }

    async fn resolve_uncached(&self, repo: &str, issue_number: u64) -> Option<PrResolution> {
        let mut candidates: Vec<Candidate> = Vec::new();

        if let Ok(urls) = self.relationships.candidate_prs(repo, issue_number).await {
            for url in urls {
                if let Some(number) = pr_number_from_url(&url) {
                    if let Ok(pr) = self.host.view_pull_request(repo, number).await {
                        if pr.state == "OPEN" || pr.state == "open" {
                            candidates.push(Candidate { pr, source: CandidateSource::LocalDb });
                        }
                    }
                }
            }
        }

        let query = format!("fixes #{issue_number} OR closes #{issue_number}");
        let search_result = self.host.search_pull_requests(repo, &query).await;
        let search_prs = match search_result {
            Ok(prs) => prs,
            Err(_) => {
                // Split-query fallback (spec §4.K step 2).
                let fixes = self.host.search_pull_requests(repo, &format!("fixes #{issue_number}")).await;
                let closes = self.host.search_pull_requests(repo, &format!("closes #{issue_number}")).await;
                let mut merged = fixes.unwrap_or_default();
                merged.extend(closes.unwrap_or_default());
                merged
            }
        };
        for pr in search_prs {
            if !candidates.iter().any(|c| c.pr.number == pr.number) {
                candidates.push(Candidate { pr, source: CandidateSource::HostSearch });
            }
        }

        if candidates.is_empty() {
            return None;
        }

        // Canonical ordering (spec §4.K step 3): DB presence beats host
        // search; ties broken by later `updated_at_ms`, then URL sort.
        candidates.sort_by(|a, b| {
            b.source
                .cmp(&a.source)
                .then(b.pr.updated_at_ms.cmp(&a.pr.updated_at_ms))
                .then(a.pr.url.cmp(&b.pr.url))
        });

        let canonical = candidates.remove(0).pr;
        let duplicates = candidates.into_iter().map(|c| c.pr).collect();
        Some(PrResolution { canonical, duplicates })
    }
}

fn pr_number_from_url(url: &str) -> Option<u64> {
    url.rsplit('/').next()?.parse().ok()
}

#[cfg(test)]
#[path = "pr_resolver_tests.rs"]
mod tests;
