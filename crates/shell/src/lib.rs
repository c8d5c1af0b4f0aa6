// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ralph-shell: subprocess execution helper used by the worker's Setup
//! stage (spec §4.E step 3) and by the real `HostClient`/`SessionRunner`
//! glue in `ralph-adapters`. Git porcelain beyond worktree lifecycle
//! invariants is an explicit non-goal (spec §1), so this crate is a plain
//! command runner, not a shell-language interpreter.

mod command;
mod dirty;
mod error;

pub use command::{CommandOutput, CommandSpec};
pub use dirty::repo_has_uncommitted_changes;
pub use error::ShellError;
