use super::*;

#[test]
fn write_atomic_creates_parent_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("file.json");
    write_atomic(&path, b"{\"a\":1}").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");
}

#[test]
fn write_atomic_never_leaves_tmp_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.json");
    write_atomic(&path, b"1").unwrap();
    write_atomic(&path, b"2").unwrap();
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn file_lock_serializes_with_lock_calls() {
    let dir = tempfile::tempdir().unwrap();
    let lock = FileLock::new(dir.path().join("x.lock"));
    let out = lock.with_lock(|| Ok(42)).unwrap();
    assert_eq!(out, 42);
}

#[test]
fn file_lock_reaps_stale_lock_and_proceeds() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("x.lock");
    std::fs::write(&lock_path, b"").unwrap();
    // Backdate the lock file so it looks stale.
    let stale_time = std::time::SystemTime::now() - std::time::Duration::from_secs(120);
    filetime_set(&lock_path, stale_time);

    let lock = FileLock::new(lock_path).with_stale_after(std::time::Duration::from_secs(60));
    let out = lock.with_lock(|| Ok("ok")).unwrap();
    assert_eq!(out, "ok");
}

fn filetime_set(path: &std::path::Path, time: std::time::SystemTime) {
    let f = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    f.set_modified(time).unwrap();
}
