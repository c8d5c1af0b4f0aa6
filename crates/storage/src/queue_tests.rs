use super::*;
use ralph_core::TaskBuilder;

fn store() -> (tempfile::TempDir, TaskQueueStore) {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());
    (dir, TaskQueueStore::new(&paths))
}

#[test]
fn enqueue_then_get_round_trips() {
    let (_dir, store) = store();
    let task = TaskBuilder::default().path("r/1").build();
    store.enqueue(task.clone()).unwrap();
    let read_back = store.get("r/1").unwrap();
    assert_eq!(read_back.path, "r/1");
    assert_eq!(read_back.status, TaskStatus::Queued);
}

#[test]
fn double_enqueue_is_idempotent() {
    let (_dir, store) = store();
    let task = TaskBuilder::default().path("r/1").build();
    store.enqueue(task.clone()).unwrap();
    store.enqueue(task).unwrap();
    assert_eq!(store.all().len(), 1);
}

#[test]
fn update_status_follows_allowed_transitions() {
    let (_dir, store) = store();
    store.enqueue(TaskBuilder::default().path("r/1").build()).unwrap();

    assert!(store.update_status("r/1", TaskStatus::Starting, |_| {}).unwrap());
    assert!(store.update_status("r/1", TaskStatus::InProgress, |t| {
        t.session_id = Some("s-1".to_string());
    })
    .unwrap());

    // Illegal: in-progress -> starting.
    assert!(!store.update_status("r/1", TaskStatus::Starting, |_| {}).unwrap());

    assert!(store.update_status("r/1", TaskStatus::Done, |_| {}).unwrap());
    let done = store.get("r/1").unwrap();
    assert!(done.session_id.is_none());
}

#[test]
fn update_status_on_unknown_path_returns_false() {
    let (_dir, store) = store();
    assert!(!store.update_status("missing", TaskStatus::Starting, |_| {}).unwrap());
}

#[test]
fn group_by_repo_preserves_order() {
    let tasks = vec![
        TaskBuilder::default().path("a/1").repo("owner/a").build(),
        TaskBuilder::default().path("b/1").repo("owner/b").build(),
        TaskBuilder::default().path("a/2").repo("owner/a").build(),
    ];
    let grouped = TaskQueueStore::group_by_repo(&tasks);
    let a_paths: Vec<_> = grouped["owner/a"].iter().map(|t| t.path.clone()).collect();
    assert_eq!(a_paths, vec!["a/1", "a/2"]);
}
