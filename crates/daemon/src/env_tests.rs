// SPDX-License-Identifier: MIT

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn defaults_when_unset() {
    for key in [
        "RALPH_GLOBAL_CAPACITY",
        "RALPH_REPO_CAPACITY",
        "RALPH_MONITOR_POLL_MS",
        "RALPH_HEARTBEAT_MS",
        "RALPH_DRAIN_TIMEOUT_MS",
        "RALPH_WATCHDOG_SOFT_MS",
        "RALPH_WATCHDOG_HARD_MS",
        "RALPH_STALL_IDLE_MS",
        "RALPH_MERGE_CONFLICT_MAX_ATTEMPTS",
        "RALPH_CI_REMEDIATION_MAX_ATTEMPTS",
    ] {
        std::env::remove_var(key);
    }

    assert_eq!(global_capacity(), 4);
    assert_eq!(repo_capacity(), 1);
    assert_eq!(monitor_poll_interval(), Duration::from_secs(1));
    assert_eq!(drain_timeout(), Duration::from_secs(30));
    assert_eq!(watchdog_soft_ms(), 5 * 60_000);
    assert_eq!(watchdog_hard_ms(), 15 * 60_000);
    assert_eq!(stall_idle_ms(), 10 * 60_000);
    assert_eq!(merge_conflict_max_attempts(), 2);
    assert_eq!(ci_remediation_max_attempts(), 5);
}

#[test]
#[serial]
fn overrides_are_honored() {
    std::env::set_var("RALPH_GLOBAL_CAPACITY", "9");
    std::env::set_var("RALPH_WATCHDOG_SOFT_MS", "1234");

    assert_eq!(global_capacity(), 9);
    assert_eq!(watchdog_soft_ms(), 1234);

    std::env::remove_var("RALPH_GLOBAL_CAPACITY");
    std::env::remove_var("RALPH_WATCHDOG_SOFT_MS");
}

#[test]
#[serial]
fn malformed_override_falls_back_to_default() {
    std::env::set_var("RALPH_REPO_CAPACITY", "not-a-number");
    assert_eq!(repo_capacity(), 1);
    std::env::remove_var("RALPH_REPO_CAPACITY");
}

#[test]
#[serial]
fn agent_command_splits_on_whitespace_with_default_fallback() {
    std::env::remove_var("RALPH_AGENT_COMMAND");
    assert_eq!(agent_command(), vec!["ralph-agent".to_string()]);

    std::env::set_var("RALPH_AGENT_COMMAND", "ralph-agent --mode=headless");
    assert_eq!(
        agent_command(),
        vec!["ralph-agent".to_string(), "--mode=headless".to_string()]
    );
    std::env::remove_var("RALPH_AGENT_COMMAND");
}

#[test]
#[serial]
fn host_base_url_and_token_are_none_when_unset_or_empty() {
    std::env::remove_var("RALPH_HOST_BASE_URL");
    std::env::remove_var("RALPH_HOST_TOKEN");
    assert_eq!(host_base_url(), None);
    assert_eq!(host_token(), None);

    std::env::set_var("RALPH_HOST_BASE_URL", "");
    assert_eq!(host_base_url(), None);
    std::env::remove_var("RALPH_HOST_BASE_URL");
}
