// SPDX-License-Identifier: MIT

//! Control file (`control.json`, spec §3 `ControlState`, §6).
//!
//! Unknown fields are ignored on read; `version` is forced to `1` on write.
//! A malformed file never replaces a previously valid in-memory snapshot —
//! "last-known-good" per spec §3/§8.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::atomic::{write_atomic, StorageError};
use crate::paths::ControlPaths;

/// A pipeline checkpoint name as written in `pause_at_checkpoint`. Kept as a
/// thin string newtype here (rather than depending on
/// `ralph_core::PipelineCheckpoint` directly) so an operator-supplied
/// control file with a checkpoint name the binary doesn't recognize yet is
/// still round-tripped rather than rejected (unknown fields are ignored on
/// read, not unknown *values* of a known field — but this one is lenient by
/// construction).
pub type CheckpointName = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Running,
    Draining,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Running
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_requested: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_at_checkpoint: Option<CheckpointName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_ms: Option<u64>,
    #[serde(default = "one")]
    pub version: u32,
}

fn one() -> u32 {
    1
}

/// A field-level patch to a [`ControlState`]. `None` leaves a field
/// untouched; `Some(None)` clears it (spec §8 scenario 5).
#[derive(Debug, Clone, Default)]
pub struct ControlStatePatch {
    pub mode: Option<Mode>,
    pub pause_requested: Option<Option<bool>>,
    pub pause_at_checkpoint: Option<Option<CheckpointName>>,
    pub drain_timeout_ms: Option<Option<u64>>,
}

impl ControlState {
    pub fn apply(&mut self, patch: ControlStatePatch) {
        if let Some(mode) = patch.mode {
            self.mode = mode;
        }
        if let Some(v) = patch.pause_requested {
            self.pause_requested = v;
        }
        if let Some(v) = patch.pause_at_checkpoint {
            self.pause_at_checkpoint = v;
        }
        if let Some(v) = patch.drain_timeout_ms {
            self.drain_timeout_ms = v;
        }
        self.version = 1;
    }
}

/// Reads/writes `control.json`, retaining the last well-formed snapshot in
/// memory across malformed or missing reads (spec §4.C, §8).
pub struct ControlStateStore {
    path: PathBuf,
    last_good: Mutex<ControlState>,
    last_warned_missing: AtomicI64,
}

impl ControlStateStore {
    pub fn new(paths: &ControlPaths) -> Self {
        Self {
            path: paths.control_file(),
            last_good: Mutex::new(ControlState::default()),
            last_warned_missing: AtomicI64::new(-1),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Reads the current state. On a missing file, returns (and caches) the
    /// default `running` state, warning at most once. On a malformed file,
    /// returns the last known-good snapshot (initially default), warning via
    /// the caller-supplied `mtime` key so repeats of the same bad write
    /// don't re-warn.
    pub fn read(&self) -> ControlState {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<ControlState>(&contents) {
                Ok(mut state) => {
                    state.version = 1;
                    *self.last_good.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
                    state
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "malformed control.json, retaining last-known-good");
                    self.last_good.lock().unwrap_or_else(|e| e.into_inner()).clone()
                }
            },
            Err(_) => {
                if self.last_warned_missing.swap(1, Ordering::Relaxed) != 1 {
                    tracing::warn!(path = %self.path.display(), "control.json missing, defaulting to running");
                }
                ControlState::default()
            }
        }
    }

    /// Writes a full state, forcing `version = 1`.
    pub fn write(&self, mut state: ControlState) -> Result<(), StorageError> {
        state.version = 1;
        let json = serde_json::to_vec_pretty(&state)?;
        write_atomic(&self.path, &json)?;
        *self.last_good.lock().unwrap_or_else(|e| e.into_inner()) = state;
        Ok(())
    }

    /// Reads the current state, applies `patch`, and writes it back.
    /// Applying the same patch twice yields byte-identical content (spec §8
    /// idempotence).
    pub fn update(&self, patch: ControlStatePatch) -> Result<ControlState, StorageError> {
        let mut state = self.read();
        state.apply(patch);
        self.write(state.clone())?;
        Ok(state)
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
