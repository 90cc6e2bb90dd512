//! Timeout combinator
//!
//! Neither the retry handler nor the breaker bounds how long an operation may
//! run. Wrap the operation with [`with_timeout`] when a deadline is needed.

use std::future::Future;
use std::time::Duration;

use crate::error::OperationTimedOut;

/// Race `future` against `limit`
///
/// On expiry the future is dropped and `E::from(OperationTimedOut)` is returned.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use teamflow_resilience::{with_timeout, OperationTimedOut};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let result: Result<(), OperationTimedOut> = with_timeout(
///     Duration::from_millis(5),
///     async {
///         tokio::time::sleep(Duration::from_secs(1)).await;
///         Ok(())
///     },
/// )
/// .await;
/// assert!(result.is_err());
/// # }
/// ```
pub async fn with_timeout<T, E, Fut>(limit: Duration, future: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: From<OperationTimedOut>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(OperationTimedOut { limit }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Failed,
        TimedOut(Duration),
    }

    impl From<OperationTimedOut> for TestError {
        fn from(err: OperationTimedOut) -> Self {
            TestError::TimedOut(err.limit)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_within_limit() {
        let result: Result<u8, TestError> =
            with_timeout(Duration::from_secs(1), async { Ok(3) }).await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_error_passes_through() {
        let result: Result<u8, TestError> =
            with_timeout(Duration::from_secs(1), async { Err(TestError::Failed) }).await;
        assert_eq!(result, Err(TestError::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_maps_to_timeout_error() {
        let start = tokio::time::Instant::now();
        let result: Result<u8, TestError> = with_timeout(Duration::from_secs(30), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;

        assert_eq!(result, Err(TestError::TimedOut(Duration::from_secs(30))));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }
}
