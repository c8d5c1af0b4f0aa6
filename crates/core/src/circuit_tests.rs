// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn normalize_lowercases_and_collapses_whitespace() {
    assert_eq!(normalize_reason("  Foo   BAR  "), "foo bar");
}

#[test]
fn normalize_replaces_urls() {
    let normalized = normalize_reason("fetch failed for https://example.com/a/b?x=1 see log");
    assert_eq!(normalized, "fetch failed for <url> see log");
}

#[test]
fn normalize_replaces_long_hex_runs() {
    let normalized = normalize_reason("commit deadbeefcafe0123 failed");
    assert_eq!(normalized, "commit <hex> failed");
}

#[test]
fn normalize_replaces_digit_runs() {
    let normalized = normalize_reason("exit code 137 after 42 retries");
    assert_eq!(normalized, "exit code <n> after <n> retries");
}

#[test]
fn fingerprint_is_stable_for_equivalent_reasons() {
    let a = fingerprint("Timeout after 30s (attempt 3)");
    let b = fingerprint("timeout after   30s (attempt 3)");
    assert_eq!(a, b);
}

#[test]
fn backoff_delay_doubles_and_clamps_to_cap() {
    assert_eq!(backoff_delay_ms(2, 1000, 60_000), 1000);
    assert_eq!(backoff_delay_ms(3, 1000, 60_000), 2000);
    assert_eq!(backoff_delay_ms(4, 1000, 60_000), 4000);
    assert_eq!(backoff_delay_ms(20, 1000, 60_000), 60_000);
}

fn test_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        window_ms: 60_000,
        open_after: 4,
        backoff_base_ms: 1000,
        backoff_cap_ms: 60_000,
        jitter_max_ms: 0,
    }
}

/// The scripted scenario from spec §8 item 4.
#[test]
fn scripted_failure_sequence_matches_section_8_scenario_4() {
    let mut breaker = IssueCircuitBreaker::new(test_config());

    assert_eq!(
        breaker.record_failure("owner/repo", 1, "boom", 1000),
        CircuitDecision::None
    );
    assert_eq!(
        breaker.record_failure("owner/repo", 1, "boom", 2000),
        CircuitDecision::Backoff { delay_ms: 1000, resume_at_ms: 3000, count: 2, opened: false }
    );
    assert_eq!(
        breaker.record_failure("owner/repo", 1, "boom", 3000),
        CircuitDecision::Backoff { delay_ms: 2000, resume_at_ms: 5000, count: 3, opened: false }
    );
    assert_eq!(
        breaker.record_failure("owner/repo", 1, "boom", 4000),
        CircuitDecision::Open { count: 4 }
    );
    assert_eq!(
        breaker.record_failure("owner/repo", 1, "boom", 5000),
        CircuitDecision::Backoff { delay_ms: 8000, resume_at_ms: 13_000, count: 5, opened: true }
    );

    let after_window = 5000 + 60_000 + 1;
    assert_eq!(
        breaker.record_failure("owner/repo", 1, "boom", after_window),
        CircuitDecision::None
    );
}

#[test]
fn distinct_fingerprints_are_tracked_independently() {
    let mut breaker = IssueCircuitBreaker::new(test_config());
    assert_eq!(
        breaker.record_failure("owner/repo", 1, "network timeout", 1000),
        CircuitDecision::None
    );
    assert_eq!(
        breaker.record_failure("owner/repo", 1, "permission denied", 1100),
        CircuitDecision::None,
        "a different failure reason is a different fingerprint bucket"
    );
}

#[test]
fn clear_issue_resets_all_fingerprints_for_that_issue() {
    let mut breaker = IssueCircuitBreaker::new(test_config());
    breaker.record_failure("owner/repo", 1, "boom", 1000);
    breaker.record_failure("owner/repo", 1, "boom", 2000);
    breaker.clear_issue("owner/repo", 1);
    assert_eq!(
        breaker.record_failure("owner/repo", 1, "boom", 2100),
        CircuitDecision::None
    );
}

#[test]
fn different_issues_do_not_share_state() {
    let mut breaker = IssueCircuitBreaker::new(test_config());
    breaker.record_failure("owner/repo", 1, "boom", 1000);
    assert_eq!(
        breaker.record_failure("owner/repo", 2, "boom", 1000),
        CircuitDecision::None
    );
}
