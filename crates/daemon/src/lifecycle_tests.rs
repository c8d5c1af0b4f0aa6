// SPDX-License-Identifier: MIT

use super::*;
use ralph_core::{Task, TaskBuilder};
use ralph_storage::Mode;

fn task(path: &str, status: TaskStatus) -> Task {
    let mut t = TaskBuilder::default().path(path).repo("owner/repo-a").issue_ref("owner/repo-a#1").build();
    t.status = status;
    t
}

#[test]
fn start_acquires_lock_and_writes_registry_record() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());

    let state = DaemonState::start(paths.clone()).unwrap();
    assert!(state.registry.read().is_some());

    // A second instance against the same root cannot acquire the lock.
    let second = DaemonState::start(paths);
    assert!(matches!(second, Err(LifecycleError::AlreadyRunning(_))));
}

#[test]
fn reconcile_requeues_in_progress_and_starting_orphans() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());
    let state = DaemonState::start(paths).unwrap();

    let mut in_progress = task("repo-a/1", TaskStatus::InProgress);
    in_progress.session_id = Some("sess-1".to_string());
    state.queue.enqueue(in_progress).unwrap();

    let starting = task("repo-a/2", TaskStatus::Starting);
    state.queue.enqueue(starting).unwrap();

    let done = task("repo-a/3", TaskStatus::Done);
    state.queue.enqueue(done).unwrap();

    let reconciled = state.reconcile_orphans().unwrap();
    assert_eq!(reconciled, 2);

    let t1 = state.queue.get("repo-a/1").unwrap();
    assert_eq!(t1.status, TaskStatus::Throttled);
    assert!(t1.session_id.is_none());
    assert!(t1.resume_at.is_some());

    let t2 = state.queue.get("repo-a/2").unwrap();
    assert_eq!(t2.status, TaskStatus::Throttled);

    let t3 = state.queue.get("repo-a/3").unwrap();
    assert_eq!(t3.status, TaskStatus::Done);
}

#[tokio::test]
async fn shutdown_flips_mode_and_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());
    let state = DaemonState::start(paths.clone()).unwrap();
    let control = state.control.clone();

    state.shutdown(Duration::from_millis(50), || 0).await;

    assert_eq!(control.read().mode, Mode::Draining);

    // The lock is now free for a new instance.
    let restarted = DaemonState::start(paths);
    assert!(restarted.is_ok());
}
