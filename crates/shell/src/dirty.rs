// SPDX-License-Identifier: MIT

//! Dirty-repo detection for the worker's Preflight stage (spec §4.E step 1:
//! "refuse if repo root has uncommitted changes and task is not isolated to
//! a worktree").

use std::path::Path;
use std::time::Duration;

use crate::command::CommandSpec;
use crate::error::ShellError;

/// Returns `true` if `repo_root` has any uncommitted changes (tracked or
/// untracked) per `git status --porcelain`.
pub async fn repo_has_uncommitted_changes(repo_root: &Path) -> Result<bool, ShellError> {
    let spec = CommandSpec::new("git", repo_root)
        .args(["status", "--porcelain"])
        .timeout(Duration::from_secs(30));
    let out = spec.run().await?;
    Ok(!out.stdout.trim().is_empty())
}

#[cfg(test)]
#[path = "dirty_tests.rs"]
mod tests;
