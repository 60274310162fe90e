//! State engines
//!
//! Each engine validates, persists, then broadcasts. Nothing is dispatched
//! for an operation whose store write failed.

pub mod annotations;
pub mod lifecycle;
pub mod locks;
pub mod qa;

pub use annotations::AnnotationEngine;
pub use lifecycle::SessionLifecycle;
pub use locks::KeyedLocks;
pub use qa::QaEngine;

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::store::{StoreError, StoreResult};

const RETRY_BACKOFF: Duration = Duration::from_millis(15);

/// Run an idempotent store operation, retrying on `StoreError::Conflict`
///
/// After `attempts` conflicts the last conflict is returned to the caller.
pub(crate) async fn retry_on_conflict<T, F, Fut>(attempts: u32, what: &str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(StoreError::Conflict(reason)) if attempt < attempts => {
                debug!(what, attempt, %reason, "Store conflict, retrying");
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_recovers_from_transient_conflict() {
        let calls = &AtomicU32::new(0);
        let result = retry_on_conflict(3, "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Conflict("busy".into()))
            } else {
                Ok(5)
            }
        })
        .await;
        assert_eq!(result, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_limit() {
        let calls = &AtomicU32::new(0);
        let result: StoreResult<i64> = retry_on_conflict(3, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict("busy".into()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backend_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: StoreResult<i64> = retry_on_conflict(3, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("disk".into()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
