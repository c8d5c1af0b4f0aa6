// SPDX-License-Identifier: MIT

//! Centralized environment-variable access for the daemon binary (spec
//! §4.A/§4.F/§6). `ralph_storage::ControlPaths` already owns canonical vs.
//! legacy control-plane *path* resolution; everything here is a timing
//! knob layered on top of injected defaults, mirroring the shape but never
//! a config-file parser.

use std::time::Duration;

/// Global task concurrency (spec §4.B `Semaphore.capacity`).
pub fn global_capacity() -> usize {
    env_usize("RALPH_GLOBAL_CAPACITY").unwrap_or(4)
}

/// Per-repo task concurrency (spec §4.B per-repo semaphore factory).
pub fn repo_capacity() -> usize {
    env_usize("RALPH_REPO_CAPACITY").unwrap_or(1)
}

/// Drain/Pause Monitor poll interval (spec §4.C "default 1s interval").
pub fn monitor_poll_interval() -> Duration {
    env_duration_ms("RALPH_MONITOR_POLL_MS").unwrap_or(Duration::from_secs(1))
}

/// Registry heartbeat interval (spec §3 `DaemonRecord.heartbeatAt`).
pub fn heartbeat_interval() -> Duration {
    env_duration_ms("RALPH_HEARTBEAT_MS")
        .unwrap_or(Duration::from_secs(ralph_storage::registry::HEARTBEAT_INTERVAL_SECS))
}

/// Graceful-shutdown drain timeout (spec §4.C `drain_timeout_ms` default,
/// used when `control.json` doesn't set one).
pub fn drain_timeout() -> Duration {
    env_duration_ms("RALPH_DRAIN_TIMEOUT_MS").unwrap_or(Duration::from_secs(30))
}

/// Soft watchdog threshold (spec §4.F-W).
pub fn watchdog_soft_ms() -> u64 {
    env_u64("RALPH_WATCHDOG_SOFT_MS").unwrap_or(5 * 60_000)
}

/// Hard watchdog threshold (spec §4.F-W).
pub fn watchdog_hard_ms() -> u64 {
    env_u64("RALPH_WATCHDOG_HARD_MS").unwrap_or(15 * 60_000)
}

/// Stall idle threshold (spec §4.F-S).
pub fn stall_idle_ms() -> u64 {
    env_u64("RALPH_STALL_IDLE_MS").unwrap_or(10 * 60_000)
}

/// Max merge-conflict recovery attempts (spec §4.I-MC).
pub fn merge_conflict_max_attempts() -> u32 {
    env_u64("RALPH_MERGE_CONFLICT_MAX_ATTEMPTS").map(|v| v as u32).unwrap_or(2)
}

/// Max CI-remediation attempts (spec §4.I-CI "ci-debug").
pub fn ci_remediation_max_attempts() -> u32 {
    env_u64("RALPH_CI_REMEDIATION_MAX_ATTEMPTS").map(|v| v as u32).unwrap_or(5)
}

/// Base URL of the `HostClient` REST host (spec §6 `HostClient`). No
/// default — a daemon started without it cannot talk to any issue/PR host.
pub fn host_base_url() -> Option<String> {
    std::env::var("RALPH_HOST_BASE_URL").ok().filter(|s| !s.is_empty())
}

/// Bearer token for the `HostClient` REST host.
pub fn host_token() -> Option<String> {
    std::env::var("RALPH_HOST_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Program + fixed leading arguments for the external agent-runtime
/// subprocess (spec §1 "opaque SessionRunner"). Defaults to a bare
/// `ralph-agent` lookup on `PATH`.
pub fn agent_command() -> Vec<String> {
    std::env::var("RALPH_AGENT_COMMAND")
        .ok()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .filter(|v: &Vec<String>| !v.is_empty())
        .unwrap_or_else(|| vec!["ralph-agent".to_string()])
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_duration_ms(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_millis)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
