// SPDX-License-Identifier: MIT

//! Global + per-repo admission (spec §3 `Semaphore`, §4.B, §5).
//!
//! Backed by `tokio::sync::Semaphore`, which already gives us the hard
//! invariants for free: `0 <= in_use <= capacity` (permits can't exceed
//! what was added), and a permit is released exactly once by construction
//! (it's an owned value consumed on drop, not a refcounted token). [`Permit`]
//! just wraps that in the "release closure, idempotent on repeat" shape
//! spec §3/§5 describe, via `Option::take`.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("acquire cancelled")]
pub struct Cancelled;

/// One admission slot. Dropping it (or calling [`Permit::release`], which
/// is equivalent and idempotent) returns the slot to its semaphore.
pub struct Permit {
    inner: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl Permit {
    pub fn release(mut self) {
        self.inner.take();
    }
}

/// A counted admission gate (spec §3 `Semaphore`: `{capacity, inUse, waiters}`).
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<tokio::sync::Semaphore>,
    capacity: usize,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "semaphore capacity must be > 0");
        Self { inner: Arc::new(tokio::sync::Semaphore::new(capacity)), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Non-blocking acquisition: `Some(permit)` or `None` if saturated.
    /// Used by the scheduler's synchronous dispatch pass (spec §4.B).
    pub fn try_acquire(&self) -> Option<Permit> {
        self.inner.clone().try_acquire_owned().ok().map(|p| Permit { inner: Some(p) })
    }

    /// Parks on a FIFO wait list until a permit frees up or `cancel` fires.
    /// A cancelled wait never consumes a permit (spec §5 "wake with a
    /// cancellation error and do not consume a permit").
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit, Cancelled> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            res = self.inner.clone().acquire_owned() => {
                // Semaphore is never closed in this codebase, so the only
                // error variant (`close()`'d semaphore) never occurs in
                // practice; still handled without panicking.
                res.map(|p| Permit { inner: Some(p) }).map_err(|_| Cancelled)
            }
        }
    }
}

#[cfg(test)]
#[path = "semaphore_tests.rs"]
mod tests;
