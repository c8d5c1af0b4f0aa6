// SPDX-License-Identifier: MIT

use super::*;

fn store() -> (tempfile::TempDir, ConflictLeaseStore) {
    let dir = tempfile::tempdir().unwrap();
    let paths = ControlPaths::new(dir.path().to_path_buf());
    (dir, ConflictLeaseStore::new(&paths))
}

#[test]
fn first_claim_succeeds_second_conflicts() {
    let (_dir, store) = store();
    let now = Utc::now();
    assert!(store.try_claim("o/r", 1, "worker-a", now).unwrap().claimed);
    assert!(!store.try_claim("o/r", 1, "worker-b", now).unwrap().claimed);
}

#[test]
fn release_allows_reclaim() {
    let (_dir, store) = store();
    let now = Utc::now();
    store.try_claim("o/r", 1, "worker-a", now).unwrap();
    store.release("o/r", 1).unwrap();
    assert!(store.try_claim("o/r", 1, "worker-b", now).unwrap().claimed);
}

#[test]
fn stale_lease_is_reclaimable() {
    let (_dir, store) = store();
    let old = Utc::now() - chrono::Duration::minutes(25);
    store.try_claim("o/r", 1, "worker-a", old).unwrap();
    let claim = store.try_claim("o/r", 1, "worker-b", Utc::now()).unwrap();
    assert!(claim.claimed);
    assert!(claim.stale_deleted);
}
