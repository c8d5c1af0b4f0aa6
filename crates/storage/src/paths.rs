// SPDX-License-Identifier: MIT

//! Canonical + legacy control-plane path discovery (spec §4.A, §6).
//!
//! Canonical: `$HOME/.ralph/control/`. Fallback when there is no home
//! directory: `/tmp/ralph/<uid>/control/`. Legacy locations are read-only
//! fallbacks consulted during discovery, in this fixed order (spec §9 open
//! question (iii)): canonical -> `$XDG_STATE_HOME/ralph` -> `$HOME/.local/
//! state/ralph` -> `/tmp/ralph/<uid>`.

use std::path::PathBuf;

/// Resolved set of paths for one control-plane root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPaths {
    pub root: PathBuf,
}

impl ControlPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The canonical, writable control root: `$RALPH_STATE_DIR` if set
    /// (test/operator override), else `$HOME/.ralph/control`, else
    /// `/tmp/ralph/<uid>/control`.
    pub fn canonical() -> Self {
        if let Ok(dir) = std::env::var("RALPH_STATE_DIR") {
            return Self::new(PathBuf::from(dir));
        }
        if let Some(home) = dirs::home_dir() {
            return Self::new(home.join(".ralph").join("control"));
        }
        Self::new(PathBuf::from(format!("/tmp/ralph/{}/control", current_uid())))
    }

    /// Read-only legacy candidates, in discovery order, excluding the
    /// canonical root.
    pub fn legacy_candidates() -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            out.push(PathBuf::from(xdg).join("ralph"));
        }
        if let Some(home) = dirs::home_dir() {
            out.push(home.join(".local").join("state").join("ralph"));
        }
        out.push(PathBuf::from(format!("/tmp/ralph/{}", current_uid())));
        out
    }

    pub fn control_file(&self) -> PathBuf {
        self.root.join("control.json")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.join("daemon-registry.json")
    }

    pub fn daemon_lock_file(&self) -> PathBuf {
        self.root.join("daemon.lock")
    }

    pub fn registry_lock_file(&self) -> PathBuf {
        self.root.join("registry.lock")
    }

    pub fn queue_file(&self) -> PathBuf {
        self.root.join("queue.json")
    }

    pub fn pr_create_lease_file(&self) -> PathBuf {
        self.root.join("pr-create-leases.json")
    }

    /// Ensures the root directory exists with mode 0700 (spec §6).
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        set_dir_permissions(&self.root)
    }
}

#[cfg(unix)]
fn current_uid() -> u32 {
    // SAFETY: getuid() has no preconditions and never fails.
    unsafe { libc_getuid() }
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}

#[cfg(unix)]
fn libc_getuid() -> u32 {
    // Avoid a libc dependency for a single syscall: read it from /proc on
    // Linux, falling back to 0 (rendered as a shared "unknown user" bucket)
    // everywhere else, which only weakens the tmp-fallback's uniqueness.
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| {
            s.lines().find_map(|l| {
                l.strip_prefix("Uid:")
                    .and_then(|rest| rest.split_whitespace().next())
                    .and_then(|s| s.parse::<u32>().ok())
            })
        })
        .unwrap_or(0)
}

#[cfg(unix)]
pub(crate) fn set_dir_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
pub(crate) fn set_dir_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_file_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
pub(crate) fn set_file_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
