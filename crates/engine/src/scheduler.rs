// SPDX-License-Identifier: MIT

//! Fair, preemptible two-level scheduler (spec §3 `SchedulerCursor`, §4.B,
//! §5 ordering). `FairScheduler::start_queued_tasks` is the pure dispatch
//! pass; [`DispatchController`] wraps it with the timer-coalesced "soon"
//! scheduling and watcher-double-fire idempotence spec §4.B also asks for.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use ralph_core::Task;

use crate::semaphore::{Permit, Semaphore};

/// The scheduler-wide admission verdict (spec GLOSSARY "Gate").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Running,
    Draining,
    SoftThrottled,
}

/// Global + repo permits held by one in-flight task, returned to the
/// `start_task`/`start_priority_task` callback so the worker can hold them
/// for the run's duration and release on completion.
pub struct TaskPermits {
    pub global: Permit,
    pub repo: Permit,
}

/// Per-repo semaphore capacity lookup (spec §4.B "per-repo semaphore
/// factory"). Boxed so callers can close over config without generics
/// leaking into `FairScheduler`'s type.
pub type RepoCapacityFn = Box<dyn Fn(&str) -> usize + Send + Sync>;

/// Fair, preemptible two-level scheduler (spec §4.B). Owns the in-flight
/// set and round-robin cursor exclusively (spec §3 ownership, §9 "no
/// process-wide singletons... explicit lifecycles").
pub struct FairScheduler {
    global: Semaphore,
    repo_capacity: RepoCapacityFn,
    repo_semaphores: IndexMap<String, Semaphore>,
    cursor: usize,
    in_flight: HashSet<String>,
}

impl FairScheduler {
    pub fn new(global_capacity: usize, repo_capacity: RepoCapacityFn) -> Self {
        Self {
            global: Semaphore::new(global_capacity),
            repo_capacity,
            repo_semaphores: IndexMap::new(),
            cursor: 0,
            in_flight: HashSet::new(),
        }
    }

    pub fn in_flight(&self) -> &HashSet<String> {
        &self.in_flight
    }

    pub fn global_available(&self) -> usize {
        self.global.available()
    }

    /// Marks a task as no longer in-flight (the worker calls this once its
    /// pipeline reaches a terminal or parked state).
    pub fn mark_finished(&mut self, task_path: &str) {
        self.in_flight.remove(task_path);
    }

    fn repo_semaphore(&mut self, repo: &str) -> &Semaphore {
        let cap = (self.repo_capacity)(repo).max(1);
        self.repo_semaphores.entry(repo.to_string()).or_insert_with(|| Semaphore::new(cap))
    }

    fn try_acquire_both(&mut self, repo: &str) -> Option<TaskPermits> {
        let Some(global) = self.global.try_acquire() else { return None };
        let Some(repo_permit) = self.repo_semaphore(repo).try_acquire() else {
            global.release();
            return None;
        };
        Some(TaskPermits { global, repo: repo_permit })
    }

    /// One dispatch pass (spec §4.B contract, §8 scenarios 1-3).
    ///
    /// `priority` tasks (resumes) are attempted first and are *not* gated
    /// by `gate` — draining only suppresses the round-robin `queued` pass.
    /// Returns the number of tasks started (priority + queued).
    pub fn start_queued_tasks(
        &mut self,
        gate: Gate,
        queued: &[Task],
        priority: &[Task],
        mut start_priority_task: impl FnMut(&Task, TaskPermits),
        mut start_task: impl FnMut(&Task, TaskPermits),
    ) -> usize {
        let mut started = 0;

        for task in priority {
            if self.in_flight.contains(&task.path) {
                continue;
            }
            if let Some(permits) = self.try_acquire_both(&task.repo) {
                self.in_flight.insert(task.path.clone());
                start_priority_task(task, permits);
                started += 1;
            }
        }

        if gate != Gate::Running {
            return started;
        }

        let mut groups: IndexMap<String, std::collections::VecDeque<Task>> = IndexMap::new();
        for task in queued {
            if self.in_flight.contains(&task.path) {
                continue;
            }
            groups.entry(task.repo.clone()).or_default().push_back(task.clone());
        }
        if groups.is_empty() {
            return started;
        }
        let repo_keys: Vec<String> = groups.keys().cloned().collect();
        let repo_count = repo_keys.len();
        if self.cursor >= repo_count {
            self.cursor = 0;
        }

        loop {
            if self.global.available() == 0 {
                break;
            }
            let mut started_in_rotation = false;
            for i in 0..repo_count {
                if self.global.available() == 0 {
                    break;
                }
                let idx = (self.cursor + i) % repo_count;
                let repo = repo_keys[idx].clone();
                let has_work = groups.get(&repo).is_some_and(|q| !q.is_empty());
                if !has_work {
                    continue;
                }
                if let Some(permits) = self.try_acquire_both(&repo) {
                    let Some(task) = groups.get_mut(&repo).and_then(|q| q.pop_front()) else {
                        permits.global.release();
                        permits.repo.release();
                        continue;
                    };
                    self.in_flight.insert(task.path.clone());
                    start_task(&task, permits);
                    started += 1;
                    started_in_rotation = true;
                    self.cursor = (idx + 1) % repo_count;
                }
            }
            if !started_in_rotation {
                break;
            }
        }

        started
    }
}

/// Coalesces repeated "dispatch soon" requests into a single timer fire
/// (spec §4.B `scheduleQueuedTasksSoon`/`scheduleResumeTasksSoon`): calls
/// before the timer fires do not multiply the work.
pub struct Debouncer {
    scheduled: Arc<AtomicBool>,
    delay: Duration,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { scheduled: Arc::new(AtomicBool::new(false)), delay }
    }

    /// Schedules `run` after `delay` unless a fire is already pending.
    pub fn trigger<F, Fut>(&self, run: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let scheduled = self.scheduled.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduled.store(false, Ordering::SeqCst);
            run().await;
        });
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
