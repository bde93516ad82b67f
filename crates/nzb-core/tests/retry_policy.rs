use std::sync::atomic::{AtomicUsize, Ordering};

use nzb_core::store::{with_retry, RetryPolicy};
use nzb_core::Error;

#[tokio::test]
async fn retries_transient_storage_errors_up_to_the_attempt_budget() {
    let policy = RetryPolicy {
        attempts: 3,
        delays: vec![std::time::Duration::from_millis(1); 3],
    };
    let calls = AtomicUsize::new(0);

    let result: Result<u32, Error> = with_retry(&policy, || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(Error::StorageTransient("unavailable".into()))
            } else {
                Ok(42)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn gives_up_after_exhausting_the_attempt_budget() {
    let policy = RetryPolicy {
        attempts: 2,
        delays: vec![std::time::Duration::from_millis(1); 2],
    };
    let calls = AtomicUsize::new(0);

    let result: Result<u32, Error> = with_retry(&policy, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Err(Error::StorageTransient("down".into())) }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_transient_errors_are_not_retried() {
    let policy = RetryPolicy::persistence_default();
    let calls = AtomicUsize::new(0);

    let result: Result<u32, Error> = with_retry(&policy, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Err(Error::OutOfBounds) }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
