// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ralph-adapters: the capability-bundle ports named in spec §9 ("Design
//! Notes") — `SessionRunner` (the agent runtime), `HostClient` (the VCS
//! issue/PR host), and `NotifyAdapter` (operator notifications) — as
//! async traits, plus fakes used by the engine's own test suite
//! (`test-support` feature) and a thin real `HostClient` over `reqwest`
//! for a generic REST issue/PR host.
//!
//! Both are explicit non-goals of the core per spec §1: this crate only
//! defines the narrow contract the core consumes, never an implementation
//! of an actual agent runtime or a specific VCS host's API shape.

pub mod host;
pub mod notify;
pub mod relationship;
pub mod session;

pub use host::{
    BranchProtection, CheckRun, CommitStatus, HostClient, HostError, HostErrorKind, Issue,
    IssueComment, Label, MergeStateStatus, PullRequest, ReqwestHostClient,
};
pub use notify::{DesktopNotifyAdapter, NotifyAdapter, NotifyError};
pub use relationship::{NullRelationshipProvider, RelationshipError, RelationshipProvider};
pub use session::{
    Introspection, LoopDetectionOpts, LoopTrip, RunOpts, SessionError, SessionResult, SessionRunner,
    ShellSessionRunner, StallOpts, StallTimeout, WatchdogOpts, WatchdogTimeout,
};

#[cfg(any(test, feature = "test-support"))]
pub use host::FakeHostClient;
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifyAdapter, NotifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use relationship::FakeRelationshipProvider;
#[cfg(any(test, feature = "test-support"))]
pub use session::{FakeSessionRunner, SessionCall};
