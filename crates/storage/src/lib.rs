// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ralph-storage: durable, crash-safe persistence for the control plane
//! (spec §4.A, §6) and the task queue (spec §4.D). All durable writes go
//! through [`atomic::write_atomic`] under a short-TTL lock; every reader
//! tolerates a concurrent writer by retrying and falling back to the last
//! well-formed snapshot it has seen.

pub mod atomic;
pub mod conflict_lease;
pub mod control;
pub mod lease;
pub mod lock;
pub mod paths;
pub mod queue;
pub mod registry;

pub use atomic::{write_atomic, FileLock, StorageError};
pub use conflict_lease::{ConflictLease, ConflictLeaseClaim, ConflictLeaseStore};
pub use control::{CheckpointName, ControlState, ControlStatePatch, ControlStateStore, Mode};
pub use lease::{LeaseClaim, PrCreateLease, PrCreateLeaseStore};
pub use lock::{DaemonLock, DaemonLockGuard, LockError};
pub use paths::ControlPaths;
pub use queue::{QueueError, TaskQueueStore};
pub use registry::{discover as discover_daemon_record, DaemonRecord, DaemonRegistryStore, DEFAULT_TTL_SECS};
