//! Retry of units of work that lost a serialization race.

use std::fmt::Display;
use std::future::Future;

use tracing::debug;

/// Errors that may succeed if the whole unit of work is attempted again.
pub trait Retryable {
    /// Returns true if a fresh attempt may succeed.
    fn is_retryable(&self) -> bool;
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or has been
/// retried `max_retries` times.
///
/// `op` must open a fresh unit of work on every call; a failed attempt has
/// already been rolled back by the time it returns.
pub async fn with_retries<T, E, F, Fut>(max_retries: u32, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < max_retries => {
                attempt += 1;
                debug!(attempt, error = %err, "retrying unit of work");
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("conflict")]
        Conflict,
        #[error("fatal")]
        Fatal,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Conflict)
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = &AtomicU32::new(0);
        let result = with_retries(3, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TestError::Conflict)
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_retries(2, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Conflict)
        })
        .await;
        assert!(matches!(result, Err(TestError::Conflict)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_fatal_errors() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_retries(5, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Fatal)
        })
        .await;
        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
