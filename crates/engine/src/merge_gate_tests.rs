// SPDX-License-Identifier: MIT

use super::*;
use ralph_adapters::{FakeHostClient, HostErrorKind, MergeStateStatus};

fn pr() -> PullRequest {
    PullRequest {
        number: 1,
        url: "https://host/o/r/pull/1".into(),
        state: "OPEN".into(),
        head_sha: "sha1".into(),
        head_ref: "ralph/issue-1".into(),
        base_ref: "main".into(),
        merge_state_status: MergeStateStatus::Clean,
        updated_at_ms: 0,
        labels: vec![],
    }
}

fn check(name: &str, state: &str) -> CheckRun {
    CheckRun { name: name.to_string(), raw_state: state.to_string(), run_id: "1".into(), details_url: None }
}

#[test]
fn missing_contexts_returns_required_not_present() {
    let required = vec!["ci".to_string(), "lint".to_string()];
    let available = vec!["ci".to_string()];
    assert_eq!(missing_contexts(&required, &available), vec!["lint".to_string()]);
}

#[tokio::test]
async fn resolver_prefers_override_over_branch_protection() {
    let host = FakeHostClient::new();
    host.set_branch_protection("o/r", "ralph/bot", BranchProtection {
        required_status_checks: vec!["other".into()],
        strict: true,
        enforce_admins: true,
    });
    let resolver = RequiredChecksResolver::new();
    let config = RequiredChecksConfig {
        override_contexts: Some(vec!["ci".into()]),
        bot_branch: "ralph/bot".into(),
        default_branch: "main".into(),
    };
    let resolved = resolver.resolve(&host, "o/r", &config).await.unwrap();
    assert_eq!(resolved, vec!["ci".to_string()]);
}

#[tokio::test]
async fn resolver_falls_back_to_default_branch_protection() {
    let host = FakeHostClient::new();
    host.set_branch_protection("o/r", "main", BranchProtection {
        required_status_checks: vec!["ci".into()],
        strict: true,
        enforce_admins: true,
    });
    let resolver = RequiredChecksResolver::new();
    let config = RequiredChecksConfig { override_contexts: None, bot_branch: "ralph/bot".into(), default_branch: "main".into() };
    let resolved = resolver.resolve(&host, "o/r", &config).await.unwrap();
    assert_eq!(resolved, vec!["ci".to_string()]);
}

#[tokio::test]
async fn resolver_memoizes_per_repo() {
    let host = FakeHostClient::new();
    host.set_branch_protection("o/r", "main", BranchProtection {
        required_status_checks: vec!["ci".into()],
        strict: true,
        enforce_admins: true,
    });
    let resolver = RequiredChecksResolver::new();
    let config = RequiredChecksConfig { override_contexts: None, bot_branch: "ralph/bot".into(), default_branch: "main".into() };
    resolver.resolve(&host, "o/r", &config).await.unwrap();
    host.set_branch_protection("o/r", "main", BranchProtection {
        required_status_checks: vec!["changed".into()],
        strict: true,
        enforce_admins: true,
    });
    let resolved = resolver.resolve(&host, "o/r", &config).await.unwrap();
    assert_eq!(resolved, vec!["ci".to_string()]);
}

#[tokio::test]
async fn ensure_branch_protection_is_noop_with_no_required_checks() {
    let host = FakeHostClient::new();
    let logger = RateLimitedLogger::default();
    let outcome = ensure_branch_protection(&host, "o/r", "ralph/bot", &[], &logger).await.unwrap();
    assert_eq!(outcome, BranchProtectionOutcome::NoOp);
}

#[tokio::test]
async fn ensure_branch_protection_defers_when_bot_branch_missing_contexts() {
    let host = FakeHostClient::new();
    let logger = RateLimitedLogger::default();
    let required = vec!["ci".to_string()];
    let outcome = ensure_branch_protection(&host, "o/r", "ralph/bot", &required, &logger).await.unwrap();
    assert_eq!(outcome, BranchProtectionOutcome::Deferred { missing: vec!["ci".to_string()] });
}

#[tokio::test]
async fn ensure_branch_protection_applies_when_all_contexts_present() {
    let host = FakeHostClient::new();
    host.set_branch_protection("o/r", "ralph/bot", BranchProtection {
        required_status_checks: vec!["ci".into()],
        strict: false,
        enforce_admins: false,
    });
    let logger = RateLimitedLogger::default();
    let required = vec!["ci".to_string()];
    let outcome = ensure_branch_protection(&host, "o/r", "ralph/bot", &required, &logger).await.unwrap();
    assert_eq!(outcome, BranchProtectionOutcome::Applied);
}

#[test]
fn merge_into_bot_branch_always_allowed() {
    assert!(merge_into_base_allowed("ralph/bot", "ralph/bot", "main", &[], "ralph-override"));
}

#[test]
fn merge_into_non_default_non_bot_branch_allowed() {
    assert!(merge_into_base_allowed("feature/x", "ralph/bot", "main", &[], "ralph-override"));
}

#[test]
fn merge_into_default_branch_requires_override_label() {
    assert!(!merge_into_base_allowed("main", "ralph/bot", "main", &[], "ralph-override"));
    assert!(merge_into_base_allowed("main", "ralph/bot", "main", &["ralph-override".to_string()], "ralph-override"));
}

#[test]
fn classify_required_checks_all_success() {
    let required = vec!["ci".to_string()];
    let checks = vec![check("ci", "success")];
    assert_eq!(classify_required_checks(&required, &checks), RequiredChecksStatus::AllSuccess);
}

#[test]
fn classify_required_checks_pending_when_absent() {
    let required = vec!["ci".to_string()];
    assert_eq!(classify_required_checks(&required, &[]), RequiredChecksStatus::Pending);
}

#[test]
fn classify_required_checks_failed_wins_over_pending() {
    let required = vec!["ci".to_string(), "lint".to_string()];
    let checks = vec![check("ci", "failure")];
    match classify_required_checks(&required, &checks) {
        RequiredChecksStatus::Failed(failed) => assert_eq!(failed.len(), 1),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
fn classify_merge_error_retryable_on_base_modified() {
    let err = ralph_adapters::HostError {
        kind: HostErrorKind::Conflict,
        status: 405,
        request_id: None,
        resume_at_ts: None,
        message: "Base branch was modified".into(),
        response_text: String::new(),
    };
    assert_eq!(classify_merge_error(&err), MergeAttemptOutcome::RetryableConflict);
}

#[test]
fn classify_merge_error_non_conflict_is_failed() {
    let err = ralph_adapters::HostError {
        kind: HostErrorKind::Forbidden,
        status: 403,
        request_id: None,
        resume_at_ts: None,
        message: "not allowed".into(),
        response_text: String::new(),
    };
    assert_eq!(classify_merge_error(&err), MergeAttemptOutcome::Failed("not allowed".to_string()));
}

#[test]
fn head_branch_safe_to_delete_only_when_sha_matches_both() {
    let p = pr();
    assert!(head_branch_still_at_merged_sha(&p, "sha1", "sha1"));
    assert!(!head_branch_still_at_merged_sha(&p, "sha1", "sha2"));
    let mut moved = pr();
    moved.head_sha = "sha2".into();
    assert!(!head_branch_still_at_merged_sha(&moved, "sha1", "sha1"));
}
