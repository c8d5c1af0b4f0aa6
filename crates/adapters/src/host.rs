// SPDX-License-Identifier: MIT

//! `HostClient` — the narrow VCS-issue/PR-host port (spec §1, §6, §9).
//!
//! The core never assumes a specific hosting service's API shape; it only
//! calls this trait and interprets the structured error kinds. A thin
//! `reqwest`-backed implementation is provided for a generic REST issue/PR
//! host (bearer-token auth, JSON bodies) — concrete host quirks (GraphQL,
//! pagination cursors, webhook shapes) are explicitly out of scope per
//! spec §1.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds surfaced by a [`HostClient`] call (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorKind {
    RateLimit,
    NotFound,
    Conflict,
    Forbidden,
    Other,
}

#[derive(Debug, Error, Clone)]
#[error("host error ({kind:?}, status {status}): {message}")]
pub struct HostError {
    pub kind: HostErrorKind,
    pub status: u16,
    pub request_id: Option<String>,
    /// Rate-limit resume hint from the host, consumed by the Rate-Limit
    /// Pause component (spec §4.J / §7 `HostRateLimited`).
    pub resume_at_ts: Option<i64>,
    pub message: String,
    pub response_text: String,
}

impl HostError {
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: HostErrorKind::Other,
            status: 0,
            request_id: None,
            resume_at_ts: None,
            message: message.into(),
            response_text: String::new(),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind == HostErrorKind::RateLimit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BranchProtection {
    #[serde(default)]
    pub required_status_checks: Vec<String>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub enforce_admins: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRun {
    pub name: String,
    /// Raw state as reported by the host (`success`, `failure`, `pending`,
    /// `unknown`, ...). The merge gate interprets this, not this crate.
    pub raw_state: String,
    pub run_id: String,
    #[serde(default)]
    pub details_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitStatus {
    pub state: String,
    #[serde(default)]
    pub contexts: Vec<String>,
}

/// `mergeable` / `mergeStateStatus` shape of a pull request (spec §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeStateStatus {
    Clean,
    Dirty,
    Behind,
    Blocked,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub state: String,
    pub head_sha: String,
    pub head_ref: String,
    pub base_ref: String,
    pub merge_state_status: MergeStateStatus,
    #[serde(default)]
    pub updated_at_ms: u64,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// The VCS host port (spec §1, §6, §9).
#[async_trait]
pub trait HostClient: Send + Sync + 'static {
    async fn get_issue(&self, repo: &str, number: u64) -> Result<Issue, HostError>;
    async fn search_issue_comments(&self, repo: &str, number: u64, query: &str) -> Result<Vec<IssueComment>, HostError>;
    async fn create_issue_comment(&self, repo: &str, number: u64, body: &str) -> Result<IssueComment, HostError>;
    async fn patch_issue_comment(&self, repo: &str, comment_id: u64, body: &str) -> Result<(), HostError>;
    async fn list_issue_labels(&self, repo: &str, number: u64) -> Result<Vec<Label>, HostError>;
    async fn add_issue_label(&self, repo: &str, number: u64, label: &str) -> Result<(), HostError>;
    async fn remove_issue_label(&self, repo: &str, number: u64, label: &str) -> Result<(), HostError>;

    async fn get_branch_protection(&self, repo: &str, branch: &str) -> Result<BranchProtection, HostError>;
    async fn put_branch_protection(&self, repo: &str, branch: &str, protection: &BranchProtection) -> Result<(), HostError>;

    async fn get_check_runs(&self, repo: &str, sha: &str) -> Result<Vec<CheckRun>, HostError>;
    async fn get_commit_status(&self, repo: &str, sha: &str) -> Result<CommitStatus, HostError>;

    async fn create_ref(&self, repo: &str, name: &str, sha: &str) -> Result<(), HostError>;
    async fn get_ref(&self, repo: &str, name: &str) -> Result<String, HostError>;

    async fn search_pull_requests(&self, repo: &str, query: &str) -> Result<Vec<PullRequest>, HostError>;
    async fn get_pull_request_checks(&self, repo: &str, number: u64) -> Result<Vec<CheckRun>, HostError>;
    async fn get_pull_request_files(&self, repo: &str, number: u64) -> Result<Vec<String>, HostError>;
    async fn update_pull_request_branch(&self, repo: &str, number: u64) -> Result<(), HostError>;
    async fn merge_pull_request(&self, repo: &str, number: u64) -> Result<(), HostError>;
    async fn view_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, HostError>;
}

#[async_trait]
impl<T: HostClient + ?Sized> HostClient for std::sync::Arc<T> {
    async fn get_issue(&self, repo: &str, number: u64) -> Result<Issue, HostError> {
        (**self).get_issue(repo, number).await
    }

    async fn search_issue_comments(&self, repo: &str, number: u64, query: &str) -> Result<Vec<IssueComment>, HostError> {
        (**self).search_issue_comments(repo, number, query).await
    }

    async fn create_issue_comment(&self, repo: &str, number: u64, body: &str) -> Result<IssueComment, HostError> {
        (**self).create_issue_comment(repo, number, body).await
    }

    async fn patch_issue_comment(&self, repo: &str, comment_id: u64, body: &str) -> Result<(), HostError> {
        (**self).patch_issue_comment(repo, comment_id, body).await
    }

    async fn list_issue_labels(&self, repo: &str, number: u64) -> Result<Vec<Label>, HostError> {
        (**self).list_issue_labels(repo, number).await
    }

    async fn add_issue_label(&self, repo: &str, number: u64, label: &str) -> Result<(), HostError> {
        (**self).add_issue_label(repo, number, label).await
    }

    async fn remove_issue_label(&self, repo: &str, number: u64, label: &str) -> Result<(), HostError> {
        (**self).remove_issue_label(repo, number, label).await
    }

    async fn get_branch_protection(&self, repo: &str, branch: &str) -> Result<BranchProtection, HostError> {
        (**self).get_branch_protection(repo, branch).await
    }

    async fn put_branch_protection(&self, repo: &str, branch: &str, protection: &BranchProtection) -> Result<(), HostError> {
        (**self).put_branch_protection(repo, branch, protection).await
    }

    async fn get_check_runs(&self, repo: &str, sha: &str) -> Result<Vec<CheckRun>, HostError> {
        (**self).get_check_runs(repo, sha).await
    }

    async fn get_commit_status(&self, repo: &str, sha: &str) -> Result<CommitStatus, HostError> {
        (**self).get_commit_status(repo, sha).await
    }

    async fn create_ref(&self, repo: &str, name: &str, sha: &str) -> Result<(), HostError> {
        (**self).create_ref(repo, name, sha).await
    }

    async fn get_ref(&self, repo: &str, name: &str) -> Result<String, HostError> {
        (**self).get_ref(repo, name).await
    }

    async fn search_pull_requests(&self, repo: &str, query: &str) -> Result<Vec<PullRequest>, HostError> {
        (**self).search_pull_requests(repo, query).await
    }

    async fn get_pull_request_checks(&self, repo: &str, number: u64) -> Result<Vec<CheckRun>, HostError> {
        (**self).get_pull_request_checks(repo, number).await
    }

    async fn get_pull_request_files(&self, repo: &str, number: u64) -> Result<Vec<String>, HostError> {
        (**self).get_pull_request_files(repo, number).await
    }

    async fn update_pull_request_branch(&self, repo: &str, number: u64) -> Result<(), HostError> {
        (**self).update_pull_request_branch(repo, number).await
    }

    async fn merge_pull_request(&self, repo: &str, number: u64) -> Result<(), HostError> {
        (**self).merge_pull_request(repo, number).await
    }

    async fn view_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, HostError> {
        (**self).view_pull_request(repo, number).await
    }
}

/// Thin `reqwest`-backed `HostClient` for a generic bearer-token REST host.
/// `base_url` is expected to already include the API version prefix; paths
/// below are relative (`/repos/{repo}/issues/{n}` etc) in a GitHub-shaped
/// but not GitHub-specific layout, matching spec §1's "generic VCS host"
/// framing.
#[derive(Clone)]
pub struct ReqwestHostClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ReqwestHostClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, HostError> {
        let resp = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| HostError::other(e.to_string()))?;
        self.check_status(&resp)?;
        resp.json::<T>().await.map_err(|e| HostError::other(format!("invalid response body: {e}")))
    }

    async fn send_no_body(&self, req: reqwest::RequestBuilder) -> Result<(), HostError> {
        let resp = req.bearer_auth(&self.token).send().await.map_err(|e| HostError::other(e.to_string()))?;
        self.check_status(&resp)?;
        Ok(())
    }

    fn check_status(&self, resp: &reqwest::Response) -> Result<(), HostError> {
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status().as_u16();
        let request_id = resp
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let resume_at_ts = resp
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .map(|secs| secs * 1000);
        let kind = match status {
            403 if resp.headers().get("x-ratelimit-remaining").is_some() => HostErrorKind::RateLimit,
            429 => HostErrorKind::RateLimit,
            403 => HostErrorKind::Forbidden,
            404 => HostErrorKind::NotFound,
            409 => HostErrorKind::Conflict,
            _ => HostErrorKind::Other,
        };
        Err(HostError {
            kind,
            status,
            request_id,
            resume_at_ts,
            message: format!("request failed with status {status}"),
            response_text: String::new(),
        })
    }
}

#[async_trait]
impl HostClient for ReqwestHostClient {
    async fn get_issue(&self, repo: &str, number: u64) -> Result<Issue, HostError> {
        self.send(self.client.get(self.url(&format!("/repos/{repo}/issues/{number}")))).await
    }

    async fn search_issue_comments(&self, repo: &str, number: u64, query: &str) -> Result<Vec<IssueComment>, HostError> {
        self.send(
            self.client
                .get(self.url(&format!("/repos/{repo}/issues/{number}/comments")))
                .query(&[("q", query)]),
        )
        .await
    }

    async fn create_issue_comment(&self, repo: &str, number: u64, body: &str) -> Result<IssueComment, HostError> {
        let payload = HashMap::from([("body", body)]);
        self.send(self.client.post(self.url(&format!("/repos/{repo}/issues/{number}/comments"))).json(&payload))
            .await
    }

    async fn patch_issue_comment(&self, repo: &str, comment_id: u64, body: &str) -> Result<(), HostError> {
        let payload = HashMap::from([("body", body)]);
        self.send_no_body(
            self.client.patch(self.url(&format!("/repos/{repo}/issues/comments/{comment_id}"))).json(&payload),
        )
        .await
    }

    async fn list_issue_labels(&self, repo: &str, number: u64) -> Result<Vec<Label>, HostError> {
        self.send(self.client.get(self.url(&format!("/repos/{repo}/issues/{number}/labels")))).await
    }

    async fn add_issue_label(&self, repo: &str, number: u64, label: &str) -> Result<(), HostError> {
        let payload = HashMap::from([("labels", vec![label])]);
        self.send_no_body(self.client.post(self.url(&format!("/repos/{repo}/issues/{number}/labels"))).json(&payload))
            .await
    }

    async fn remove_issue_label(&self, repo: &str, number: u64, label: &str) -> Result<(), HostError> {
        self.send_no_body(self.client.delete(self.url(&format!("/repos/{repo}/issues/{number}/labels/{label}"))))
            .await
    }

    async fn get_branch_protection(&self, repo: &str, branch: &str) -> Result<BranchProtection, HostError> {
        self.send(self.client.get(self.url(&format!("/repos/{repo}/branches/{branch}/protection")))).await
    }

    async fn put_branch_protection(
        &self,
        repo: &str,
        branch: &str,
        protection: &BranchProtection,
    ) -> Result<(), HostError> {
        self.send_no_body(
            self.client.put(self.url(&format!("/repos/{repo}/branches/{branch}/protection"))).json(protection),
        )
        .await
    }

    async fn get_check_runs(&self, repo: &str, sha: &str) -> Result<Vec<CheckRun>, HostError> {
        self.send(self.client.get(self.url(&format!("/repos/{repo}/commits/{sha}/check-runs")))).await
    }

    async fn get_commit_status(&self, repo: &str, sha: &str) -> Result<CommitStatus, HostError> {
        self.send(self.client.get(self.url(&format!("/repos/{repo}/commits/{sha}/status")))).await
    }

    async fn create_ref(&self, repo: &str, name: &str, sha: &str) -> Result<(), HostError> {
        let payload = HashMap::from([("ref", name), ("sha", sha)]);
        self.send_no_body(self.client.post(self.url(&format!("/repos/{repo}/git/refs"))).json(&payload)).await
    }

    async fn get_ref(&self, repo: &str, name: &str) -> Result<String, HostError> {
        #[derive(Deserialize)]
        struct RefResp {
            sha: String,
        }
        let resp: RefResp = self.send(self.client.get(self.url(&format!("/repos/{repo}/git/refs/{name}")))).await?;
        Ok(resp.sha)
    }

    async fn search_pull_requests(&self, repo: &str, query: &str) -> Result<Vec<PullRequest>, HostError> {
        self.send(self.client.get(self.url(&format!("/repos/{repo}/pulls"))).query(&[("q", query)])).await
    }

    async fn get_pull_request_checks(&self, repo: &str, number: u64) -> Result<Vec<CheckRun>, HostError> {
        self.send(self.client.get(self.url(&format!("/repos/{repo}/pulls/{number}/checks")))).await
    }

    async fn get_pull_request_files(&self, repo: &str, number: u64) -> Result<Vec<String>, HostError> {
        #[derive(Deserialize)]
        struct FileEntry {
            filename: String,
        }
        let files: Vec<FileEntry> =
            self.send(self.client.get(self.url(&format!("/repos/{repo}/pulls/{number}/files")))).await?;
        Ok(files.into_iter().map(|f| f.filename).collect())
    }

    async fn update_pull_request_branch(&self, repo: &str, number: u64) -> Result<(), HostError> {
        self.send_no_body(self.client.put(self.url(&format!("/repos/{repo}/pulls/{number}/update-branch")))).await
    }

    async fn merge_pull_request(&self, repo: &str, number: u64) -> Result<(), HostError> {
        self.send_no_body(self.client.put(self.url(&format!("/repos/{repo}/pulls/{number}/merge")))).await
    }

    async fn view_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, HostError> {
        self.send(self.client.get(self.url(&format!("/repos/{repo}/pulls/{number}")))).await
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    /// In-memory `HostClient` for engine/daemon tests. Seed state via the
    /// `push_*`/`set_*` helpers; calls are recorded for assertion.
    #[derive(Clone, Default)]
    pub struct FakeHostClient {
        inner: Arc<Mutex<FakeState>>,
    }

    #[derive(Default)]
    struct FakeState {
        issues: Map<(String, u64), Issue>,
        comments: Map<(String, u64), Vec<IssueComment>>,
        next_comment_id: u64,
        labels: Map<(String, u64), Vec<String>>,
        branch_protection: Map<(String, String), BranchProtection>,
        check_runs: Map<(String, String), Vec<CheckRun>>,
        commit_status: Map<(String, String), CommitStatus>,
        refs: Map<(String, String), String>,
        pull_requests: Map<(String, u64), PullRequest>,
        pr_search_results: Map<String, Vec<PullRequest>>,
        pr_files: Map<(String, u64), Vec<String>>,
        pending_errors: Vec<HostError>,
        merge_calls: Vec<(String, u64)>,
        branch_update_calls: Vec<(String, u64)>,
    }

    impl FakeHostClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_error(&self, err: HostError) {
            self.inner.lock().pending_errors.push(err);
        }

        fn maybe_err(&self) -> Option<HostError> {
            let mut g = self.inner.lock();
            if g.pending_errors.is_empty() {
                None
            } else {
                Some(g.pending_errors.remove(0))
            }
        }

        pub fn set_issue(&self, repo: &str, number: u64, issue: Issue) {
            self.inner.lock().issues.insert((repo.to_string(), number), issue);
        }

        pub fn set_labels(&self, repo: &str, number: u64, labels: Vec<String>) {
            self.inner.lock().labels.insert((repo.to_string(), number), labels);
        }

        pub fn set_branch_protection(&self, repo: &str, branch: &str, protection: BranchProtection) {
            self.inner.lock().branch_protection.insert((repo.to_string(), branch.to_string()), protection);
        }

        pub fn set_check_runs(&self, repo: &str, sha: &str, runs: Vec<CheckRun>) {
            self.inner.lock().check_runs.insert((repo.to_string(), sha.to_string()), runs);
        }

        pub fn set_ref(&self, repo: &str, name: &str, sha: &str) {
            self.inner.lock().refs.insert((repo.to_string(), name.to_string()), sha.to_string());
        }

        pub fn set_pull_request(&self, repo: &str, pr: PullRequest) {
            self.inner.lock().pull_requests.insert((repo.to_string(), pr.number), pr);
        }

        pub fn set_pr_search_results(&self, repo: &str, query: &str, prs: Vec<PullRequest>) {
            self.inner.lock().pr_search_results.insert(format!("{repo}:{query}"), prs);
        }

        pub fn set_pr_files(&self, repo: &str, number: u64, files: Vec<String>) {
            self.inner.lock().pr_files.insert((repo.to_string(), number), files);
        }

        pub fn merge_calls(&self) -> Vec<(String, u64)> {
            self.inner.lock().merge_calls.clone()
        }

        pub fn branch_update_calls(&self) -> Vec<(String, u64)> {
            self.inner.lock().branch_update_calls.clone()
        }
    }

    #[async_trait]
    impl HostClient for FakeHostClient {
        async fn get_issue(&self, repo: &str, number: u64) -> Result<Issue, HostError> {
            if let Some(e) = self.maybe_err() {
                return Err(e);
            }
            self.inner
                .lock()
                .issues
                .get(&(repo.to_string(), number))
                .cloned()
                .ok_or_else(|| HostError { kind: HostErrorKind::NotFound, status: 404, ..HostError::other("not found") })
        }

        async fn search_issue_comments(&self, repo: &str, number: u64, _query: &str) -> Result<Vec<IssueComment>, HostError> {
            Ok(self.inner.lock().comments.get(&(repo.to_string(), number)).cloned().unwrap_or_default())
        }

        async fn create_issue_comment(&self, repo: &str, number: u64, body: &str) -> Result<IssueComment, HostError> {
            let mut g = self.inner.lock();
            g.next_comment_id += 1;
            let id = g.next_comment_id;
            let comment = IssueComment { id, body: body.to_string(), author: "ralph-bot".to_string() };
            g.comments.entry((repo.to_string(), number)).or_default().push(comment.clone());
            Ok(comment)
        }

        async fn patch_issue_comment(&self, repo: &str, comment_id: u64, body: &str) -> Result<(), HostError> {
            let mut g = self.inner.lock();
            for comments in g.comments.values_mut() {
                if let Some(c) = comments.iter_mut().find(|c| c.id == comment_id) {
                    c.body = body.to_string();
                }
            }
            let _ = repo;
            Ok(())
        }

        async fn list_issue_labels(&self, repo: &str, number: u64) -> Result<Vec<Label>, HostError> {
            Ok(self
                .inner
                .lock()
                .labels
                .get(&(repo.to_string(), number))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|name| Label { name })
                .collect())
        }

        async fn add_issue_label(&self, repo: &str, number: u64, label: &str) -> Result<(), HostError> {
            self.inner.lock().labels.entry((repo.to_string(), number)).or_default().push(label.to_string());
            Ok(())
        }

        async fn remove_issue_label(&self, repo: &str, number: u64, label: &str) -> Result<(), HostError> {
            if let Some(labels) = self.inner.lock().labels.get_mut(&(repo.to_string(), number)) {
                labels.retain(|l| l != label);
            }
            Ok(())
        }

        async fn get_branch_protection(&self, repo: &str, branch: &str) -> Result<BranchProtection, HostError> {
            Ok(self.inner.lock().branch_protection.get(&(repo.to_string(), branch.to_string())).cloned().unwrap_or_default())
        }

        async fn put_branch_protection(&self, repo: &str, branch: &str, protection: &BranchProtection) -> Result<(), HostError> {
            self.inner.lock().branch_protection.insert((repo.to_string(), branch.to_string()), protection.clone());
            Ok(())
        }

        async fn get_check_runs(&self, repo: &str, sha: &str) -> Result<Vec<CheckRun>, HostError> {
            Ok(self.inner.lock().check_runs.get(&(repo.to_string(), sha.to_string())).cloned().unwrap_or_default())
        }

        async fn get_commit_status(&self, repo: &str, sha: &str) -> Result<CommitStatus, HostError> {
            Ok(self
                .inner
                .lock()
                .commit_status
                .get(&(repo.to_string(), sha.to_string()))
                .cloned()
                .unwrap_or(CommitStatus { state: "pending".to_string(), contexts: vec![] }))
        }

        async fn create_ref(&self, repo: &str, name: &str, sha: &str) -> Result<(), HostError> {
            self.inner.lock().refs.insert((repo.to_string(), name.to_string()), sha.to_string());
            Ok(())
        }

        async fn get_ref(&self, repo: &str, name: &str) -> Result<String, HostError> {
            self.inner
                .lock()
                .refs
                .get(&(repo.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| HostError { kind: HostErrorKind::NotFound, status: 404, ..HostError::other("ref not found") })
        }

        async fn search_pull_requests(&self, repo: &str, query: &str) -> Result<Vec<PullRequest>, HostError> {
            if let Some(e) = self.maybe_err() {
                return Err(e);
            }
            Ok(self.inner.lock().pr_search_results.get(&format!("{repo}:{query}")).cloned().unwrap_or_default())
        }

        async fn get_pull_request_checks(&self, repo: &str, number: u64) -> Result<Vec<CheckRun>, HostError> {
            let sha = self.inner.lock().pull_requests.get(&(repo.to_string(), number)).map(|p| p.head_sha.clone());
            match sha {
                Some(sha) => self.get_check_runs(repo, &sha).await,
                None => Ok(vec![]),
            }
        }

        async fn get_pull_request_files(&self, repo: &str, number: u64) -> Result<Vec<String>, HostError> {
            Ok(self.inner.lock().pr_files.get(&(repo.to_string(), number)).cloned().unwrap_or_default())
        }

        async fn update_pull_request_branch(&self, repo: &str, number: u64) -> Result<(), HostError> {
            self.inner.lock().branch_update_calls.push((repo.to_string(), number));
            Ok(())
        }

        async fn merge_pull_request(&self, repo: &str, number: u64) -> Result<(), HostError> {
            if let Some(e) = self.maybe_err() {
                return Err(e);
            }
            self.inner.lock().merge_calls.push((repo.to_string(), number));
            if let Some(pr) = self.inner.lock().pull_requests.get_mut(&(repo.to_string(), number)) {
                pr.state = "merged".to_string();
            }
            Ok(())
        }

        async fn view_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, HostError> {
            if let Some(e) = self.maybe_err() {
                return Err(e);
            }
            self.inner
                .lock()
                .pull_requests
                .get(&(repo.to_string(), number))
                .cloned()
                .ok_or_else(|| HostError { kind: HostErrorKind::NotFound, status: 404, ..HostError::other("pr not found") })
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeHostClient;

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
