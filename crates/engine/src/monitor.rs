// SPDX-License-Identifier: MIT

//! Drain/Pause Monitor (spec §4.C). Single-threaded cooperative poll over
//! `control.json`, plus a signal-driven `reload_now` for `SIGUSR1` (spec
//! §6). [`ControlStateStore`] already owns the "last-known-good on
//! malformed/missing" behavior (spec §4.A/§8); this component adds the
//! `mtime`-skip optimization and the genuine-transition-only callback spec
//! §4.C asks for.

use std::sync::Mutex;
use std::time::SystemTime;

use ralph_storage::{ControlState, ControlStateStore, Mode};

use crate::scheduler::Gate;

/// The scheduler-wide admission verdict derived from control-file mode
/// (spec GLOSSARY "Gate"). `SoftThrottled` is not driven by the control
/// file; it's reserved for a host-side throttle condition a caller may
/// layer on top (spec §4.B `gate` parameter allows three values, but only
/// `running`/`draining` come from this monitor).
impl From<Mode> for Gate {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Running => Gate::Running,
            Mode::Draining => Gate::Draining,
        }
    }
}

/// Watches `control.json` for the daemon's dispatch loop (spec §4.C).
pub struct DrainMonitor {
    store: ControlStateStore,
    last_seen_mtime: Mutex<Option<SystemTime>>,
    current: Mutex<ControlState>,
}

impl DrainMonitor {
    pub fn new(store: ControlStateStore) -> Self {
        let current = store.read();
        Self { store, last_seen_mtime: Mutex::new(None), current: Mutex::new(current) }
    }

    pub fn current(&self) -> ControlState {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn gate(&self) -> Gate {
        self.current().mode.into()
    }

    /// One cooperative poll tick (spec §4.C default 1s interval). No-op
    /// (not even a parse) if the file's `mtime` hasn't moved since the last
    /// observed tick. Returns the new mode iff this tick caused a genuine
    /// mode change — never on startup, matching spec §4.C "only on genuine
    /// mode change, never on startup" (the first `poll()` call always has
    /// `last_seen_mtime = None`, but `current` was already primed by `new`,
    /// so a first poll that sees the same content reports no change).
    pub fn poll(&self) -> Option<Mode> {
        self.reload(false)
    }

    /// Forced reload bypassing the `mtime` check (spec §6 `SIGUSR1`).
    pub fn reload_now(&self) -> Option<Mode> {
        self.reload(true)
    }

    fn reload(&self, force: bool) -> Option<Mode> {
        let mtime = std::fs::metadata(self.store.path()).and_then(|m| m.modified()).ok();
        {
            let mut last = self.last_seen_mtime.lock().unwrap_or_else(|e| e.into_inner());
            if !force && mtime == *last {
                return None;
            }
            *last = mtime;
        }

        let new_state = self.store.read();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let prev_mode = current.mode;
        let changed = new_state.mode != prev_mode;
        *current = new_state.clone();
        if changed {
            tracing::info!(from = %mode_str(prev_mode), to = %mode_str(new_state.mode), "control mode changed");
            Some(new_state.mode)
        } else {
            None
        }
    }

    /// Whether `checkpoint` is the configured pause point (spec §4.C pause
    /// semantics: "the first time a worker reaches checkpoint C").
    pub fn should_pause_at(&self, checkpoint: ralph_core::PipelineCheckpoint) -> bool {
        let state = self.current();
        state.pause_requested == Some(true) && state.pause_at_checkpoint.as_deref() == Some(checkpoint.to_string().as_str())
    }
}

fn mode_str(mode: Mode) -> &'static str {
    match mode {
        Mode::Running => "running",
        Mode::Draining => "draining",
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
