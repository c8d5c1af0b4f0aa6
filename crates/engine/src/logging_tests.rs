// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn first_call_always_logs() {
    let logger = RateLimitedLogger::new(Duration::from_secs(60));
    let mut fired = false;
    logger.log_bounded("k", || fired = true);
    assert!(fired);
}

#[test]
fn repeat_within_interval_is_suppressed() {
    let logger = RateLimitedLogger::new(Duration::from_secs(60));
    logger.log_bounded("k", || {});
    let mut fired = false;
    logger.log_bounded("k", || fired = true);
    assert!(!fired);
}

#[test]
fn distinct_keys_are_independent() {
    let logger = RateLimitedLogger::new(Duration::from_secs(60));
    logger.log_bounded("a", || {});
    let mut fired = false;
    logger.log_bounded("b", || fired = true);
    assert!(fired);
}

#[test]
fn reset_allows_immediate_relog() {
    let logger = RateLimitedLogger::new(Duration::from_secs(60));
    logger.log_bounded("k", || {});
    logger.reset("k");
    let mut fired = false;
    logger.log_bounded("k", || fired = true);
    assert!(fired);
}
