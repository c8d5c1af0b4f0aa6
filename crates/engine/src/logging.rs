// SPDX-License-Identifier: MIT

//! Bounded-rate warning dedup. The spec mentions "bounded-frequency"
//! logging in several places (§4.I defer retry, §8 boundary behavior)
//! without naming a mechanism; this is a small `(key -> last_logged_at)`
//! map reused by the merge gate and the drain monitor's callers so a
//! repeatedly-defer-retried condition doesn't flood the log on every poll.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(60);

/// Suppresses repeat log lines for the same `key` within `min_interval`.
pub struct RateLimitedLogger {
    min_interval: Duration,
    last_logged: Mutex<HashMap<String, Instant>>,
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl RateLimitedLogger {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_logged: Mutex::new(HashMap::new()) }
    }

    /// Runs `emit` iff `key` hasn't fired within `min_interval`. Always
    /// evaluated against wall-clock time — this gates log noise, not
    /// pipeline behavior, so it doesn't take a [`ralph_core::Clock`].
    pub fn log_bounded(&self, key: &str, emit: impl FnOnce()) {
        let now = Instant::now();
        let mut guard = self.last_logged.lock().unwrap_or_else(|e| e.into_inner());
        let should_emit = match guard.get(key) {
            Some(last) => now.duration_since(*last) >= self.min_interval,
            None => true,
        };
        if should_emit {
            guard.insert(key.to_string(), now);
            drop(guard);
            emit();
        }
    }

    /// Forgets `key`, so the next call always logs. Used when a condition
    /// resolves and a future recurrence should be reported immediately.
    pub fn reset(&self, key: &str) {
        self.last_logged.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
