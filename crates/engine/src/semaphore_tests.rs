// SPDX-License-Identifier: MIT

use super::*;
use std::time::Duration;

#[test]
fn try_acquire_respects_capacity() {
    let sem = Semaphore::new(2);
    let a = sem.try_acquire().expect("slot 1");
    let b = sem.try_acquire().expect("slot 2");
    assert!(sem.try_acquire().is_none());
    assert_eq!(sem.in_use(), 2);
    assert_eq!(sem.available(), 0);

    drop(a);
    assert_eq!(sem.available(), 1);
    b.release();
    assert_eq!(sem.available(), 2);
}

#[test]
fn release_is_idempotent() {
    let sem = Semaphore::new(1);
    let permit = sem.try_acquire().expect("slot");
    permit.release();
    assert_eq!(sem.available(), 1);
    // A second conceptual release (via a fresh permit) does not double-free.
    let permit2 = sem.try_acquire().expect("slot again");
    permit2.release();
    assert_eq!(sem.available(), 1);
}

#[tokio::test]
async fn acquire_parks_until_release() {
    let sem = Semaphore::new(1);
    let held = sem.try_acquire().expect("slot");
    let cancel = CancellationToken::new();

    let sem2 = sem.clone();
    let cancel2 = cancel.clone();
    let waiter = tokio::spawn(async move { sem2.acquire(&cancel2).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    held.release();
    let permit = waiter.await.expect("join").expect("acquired");
    assert_eq!(sem.available(), 0);
    drop(permit);
    assert_eq!(sem.available(), 1);
}

#[tokio::test]
async fn cancelled_wait_does_not_consume_a_permit() {
    let sem = Semaphore::new(1);
    let _held = sem.try_acquire().expect("slot");
    let cancel = CancellationToken::new();

    let sem2 = sem.clone();
    let cancel2 = cancel.clone();
    let waiter = tokio::spawn(async move { sem2.acquire(&cancel2).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    let result = waiter.await.expect("join");
    assert_eq!(result, Err(Cancelled));
}
