use super::*;

fn store() -> (tempfile::TempDir, PrCreateLeaseStore) {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());
    (dir, PrCreateLeaseStore::new(&paths))
}

#[test]
fn first_claim_succeeds_second_conflicts() {
    let (_dir, store) = store();
    let now = Utc::now();
    let a = store.try_claim("o/r", 1, "main", "worker-a", now).unwrap();
    assert!(a.claimed);

    let b = store.try_claim("o/r", 1, "main", "worker-b", now).unwrap();
    assert!(!b.claimed);
    assert!(b.existing_created_at.is_some());
}

#[test]
fn release_allows_reclaim() {
    let (_dir, store) = store();
    let now = Utc::now();
    store.try_claim("o/r", 1, "main", "worker-a", now).unwrap();
    store.release("o/r", 1, "main").unwrap();
    let b = store.try_claim("o/r", 1, "main", "worker-b", now).unwrap();
    assert!(b.claimed);
}

#[test]
fn stale_lease_is_reclaimable() {
    let (_dir, store) = store();
    let old = Utc::now() - chrono::Duration::minutes(25);
    store.try_claim("o/r", 1, "main", "worker-a", old).unwrap();

    let now = Utc::now();
    let claim = store.try_claim("o/r", 1, "main", "worker-b", now).unwrap();
    assert!(claim.claimed);
    assert!(claim.stale_deleted);
}

#[test]
fn distinct_base_branches_do_not_conflict() {
    let (_dir, store) = store();
    let now = Utc::now();
    let a = store.try_claim("o/r", 1, "main", "worker-a", now).unwrap();
    let b = store.try_claim("o/r", 1, "dev", "worker-b", now).unwrap();
    assert!(a.claimed);
    assert!(b.claimed);
}
