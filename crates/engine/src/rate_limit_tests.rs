// SPDX-License-Identifier: MIT

use super::*;
use ralph_adapters::HostErrorKind;

fn rate_limit_error(request_id: Option<&str>, resume_at_ts: Option<i64>) -> HostError {
    HostError {
        kind: HostErrorKind::RateLimit,
        status: 429,
        request_id: request_id.map(str::to_string),
        resume_at_ts,
        message: "secondary rate limit hit".to_string(),
        response_text: String::new(),
    }
}

#[test]
fn resume_at_is_never_before_now_plus_min_backoff_plus_buffer() {
    let error = rate_limit_error(Some("req-1"), None);
    let pause = compute_rate_limit_pause(&error, "build", 0, 1_000_000);
    let floor = 1_000_000 + MIN_BACKOFF_MS + SAFETY_BUFFER_MS;
    assert!(pause.resume_at_ms >= floor);
    assert!(pause.resume_at_ms < floor + JITTER_MAX_MS);
}

#[test]
fn resume_at_is_monotonic_against_prior_resume() {
    let error = rate_limit_error(Some("req-1"), None);
    let prior = 10_000_000;
    let pause = compute_rate_limit_pause(&error, "build", prior, 1_000_000);
    assert!(pause.resume_at_ms >= prior);
}

#[test]
fn same_seed_yields_same_jitter() {
    let error = rate_limit_error(Some("req-42"), None);
    let a = compute_rate_limit_pause(&error, "merge", 0, 5_000_000);
    let b = compute_rate_limit_pause(&error, "merge", 0, 5_000_000);
    assert_eq!(a.resume_at_ms, b.resume_at_ms);
}

#[test]
fn falls_back_to_stage_when_no_request_id() {
    let error = rate_limit_error(None, None);
    let pause = compute_rate_limit_pause(&error, "plan", 0, 1_000_000);
    assert_eq!(pause.snapshot.request_id, None);
    assert_eq!(pause.snapshot.stage, "plan");
}

#[test]
fn snapshot_message_is_truncated_with_ellipsis() {
    let long_message = "x".repeat(500);
    let error = HostError { message: long_message, ..rate_limit_error(Some("r"), None) };
    let pause = compute_rate_limit_pause(&error, "build", 0, 1_000_000);
    assert!(pause.snapshot.message.ends_with("..."));
    assert_eq!(pause.snapshot.message.chars().count(), 403);
}

#[test]
fn snapshot_kind_and_status_round_trip() {
    let error = rate_limit_error(Some("req-1"), Some(2_000_000));
    let pause = compute_rate_limit_pause(&error, "merge", 0, 1_000_000);
    assert_eq!(pause.snapshot.kind, "github-rate-limit");
    assert_eq!(pause.snapshot.status, 429);
    assert!(pause.resume_at_ms >= 2_000_000);
}
