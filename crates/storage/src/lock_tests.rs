use super::*;

#[test]
fn acquire_then_release_allows_reacquire() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());
    let lock = DaemonLock::new(&paths);
    let guard = lock.acquire("d-1").unwrap();
    guard.release();
    let guard2 = DaemonLock::new(&paths).acquire("d-2").unwrap();
    guard2.release();
}

#[test]
fn acquire_fails_while_held_by_live_pid() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());
    let lock = DaemonLock::new(&paths);
    let _guard = lock.acquire("d-1").unwrap();

    let err = DaemonLock::new(&paths).acquire("d-2").unwrap_err();
    assert!(matches!(err, LockError::LockHeld { .. }));
}

#[test]
fn stale_lock_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());
    let lock_path = paths.daemon_lock_file();
    std::fs::create_dir_all(paths.root.clone()).unwrap();
    let fake_pid = 999_999u32; // very unlikely to be alive
    let contents = format!(
        "{{\"daemon_id\":\"dead\",\"pid\":{fake_pid},\"started_at\":\"2020-01-01T00:00:00Z\",\"acquired_at\":\"2020-01-01T00:00:00Z\",\"token\":\"x\"}}"
    );
    std::fs::write(&lock_path, contents).unwrap();

    let guard = DaemonLock::new(&paths).acquire("d-new").unwrap();
    guard.release();
}

#[test]
fn release_is_no_op_if_token_was_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());
    let guard = DaemonLock::new(&paths).acquire("d-1").unwrap();
    // Simulate another process reclaiming after a stale timeout.
    std::fs::write(
        paths.daemon_lock_file(),
        b"{\"daemon_id\":\"other\",\"pid\":1,\"started_at\":\"2020-01-01T00:00:00Z\",\"acquired_at\":\"2020-01-01T00:00:00Z\",\"token\":\"other-token\"}",
    )
    .unwrap();
    guard.release();
    assert!(paths.daemon_lock_file().exists());
}
