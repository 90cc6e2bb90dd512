// Behavioural tests for retry + circuit breaker
//
// All timing assertions run on tokio's paused clock, so sleeps complete
// instantly and elapsed time is exact.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use teamflow_resilience::{
    is_transient, CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, CircuitState,
    RetryHandler, RetryPolicy,
};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
enum UpstreamError {
    #[error("upstream timeout (attempt {0})")]
    Timeout(u32),
    #[error("invalid request")]
    Invalid,
    #[error(transparent)]
    Open(#[from] CircuitOpenError),
}

fn retry_handler(max_attempts: u32, initial_ms: u64, max_ms: u64) -> RetryHandler {
    RetryHandler::new(
        RetryPolicy::exponential()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_millis(initial_ms))
            .with_max_delay(Duration::from_millis(max_ms))
            .with_backoff_multiplier(2.0),
    )
}

fn breaker(failure_threshold: u32, success_threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
    CircuitBreaker::new(
        "core-agent",
        CircuitBreakerConfig::new()
            .with_failure_threshold(failure_threshold)
            .with_success_threshold(success_threshold)
            .with_cooldown(Duration::from_millis(cooldown_ms)),
    )
}

async fn fail(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), UpstreamError> {
    breaker
        .execute(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(UpstreamError::Timeout(n))
        })
        .await
}

async fn succeed(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), UpstreamError> {
    breaker
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
}

// =============================================================================
// RetryHandler
// =============================================================================

#[test_log::test(tokio::test(start_paused = true))]
async fn test_always_failing_operation_runs_max_attempts() {
    for max_attempts in [1, 2, 5] {
        let handler = retry_handler(max_attempts, 10, 100);
        let calls = AtomicU32::new(0);

        let result: Result<(), UpstreamError> = handler
            .execute(
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(UpstreamError::Timeout(n))
                },
                |_| true,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
        // The last error is surfaced, not the first
        assert_eq!(result, Err(UpstreamError::Timeout(max_attempts)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_runs_once() {
    let handler = retry_handler(10, 10, 100);
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let result: Result<(), UpstreamError> = handler
        .execute(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamError::Invalid)
            },
            |err| is_transient(err),
        )
        .await;

    assert_eq!(result, Err(UpstreamError::Invalid));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_grows_then_clamps() {
    let handler = retry_handler(7, 100, 1000);
    let start = Instant::now();
    let attempts = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let _: Result<(), UpstreamError> = handler
        .execute(
            || {
                attempts.lock().push(start.elapsed());
                async { Err(UpstreamError::Timeout(0)) }
            },
            |_| true,
        )
        .await;

    let attempts = attempts.lock().clone();
    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(800),
            Duration::from_millis(1000),
            Duration::from_millis(1000),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_fails_twice_then_succeeds() {
    let handler = retry_handler(3, 10, 100);
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let result = handler
        .execute(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(UpstreamError::Timeout(n))
                } else {
                    Ok("third time lucky")
                }
            },
            |err| is_transient(err),
        )
        .await;

    assert_eq!(result, Ok("third time lucky"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 10ms before attempt 2, 20ms before attempt 3
    assert_eq!(start.elapsed(), Duration::from_millis(30));
}

// =============================================================================
// CircuitBreaker
// =============================================================================

#[test_log::test(tokio::test(start_paused = true))]
async fn test_opens_at_threshold_and_short_circuits() {
    let breaker = breaker(3, 2, 1000);
    let calls = AtomicU32::new(0);

    for n in 1..=3 {
        assert_eq!(fail(&breaker, &calls).await, Err(UpstreamError::Timeout(n)));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let result = succeed(&breaker, &calls).await;
    assert!(matches!(result, Err(UpstreamError::Open(ref e)) if e.name == "core-agent"));
    assert_eq!(calls.load(Ordering::SeqCst), 3, "operation must not run while open");
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_recovers_after_success_threshold() {
    let breaker = breaker(3, 2, 1000);
    let calls = AtomicU32::new(0);
    for _ in 0..3 {
        let _ = fail(&breaker, &calls).await;
    }

    tokio::time::advance(Duration::from_millis(1000)).await;

    assert_eq!(succeed(&breaker, &calls).await, Ok(()));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    assert_eq!(succeed(&breaker, &calls).await, Ok(()));
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(snapshot.consecutive_successes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_reopens_and_restarts_cooldown() {
    let breaker = breaker(3, 2, 1000);
    let calls = AtomicU32::new(0);
    for _ in 0..3 {
        let _ = fail(&breaker, &calls).await;
    }

    tokio::time::advance(Duration::from_millis(1500)).await;

    // Probe fails: straight back to open
    assert_eq!(fail(&breaker, &calls).await, Err(UpstreamError::Timeout(4)));
    assert_eq!(breaker.state(), CircuitState::Open);

    // Cooldown restarted at the probe failure, not the original trip
    tokio::time::advance(Duration::from_millis(900)).await;
    match succeed(&breaker, &calls).await {
        Err(UpstreamError::Open(err)) => assert_eq!(err.remaining, Duration::from_millis(100)),
        other => panic!("expected open circuit, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(succeed(&breaker, &calls).await, Ok(()));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_failure_streak() {
    let breaker = breaker(3, 2, 1000);
    let calls = AtomicU32::new(0);

    let _ = fail(&breaker, &calls).await;
    let _ = fail(&breaker, &calls).await;
    assert_eq!(breaker.snapshot().consecutive_failures, 2);

    succeed(&breaker, &calls).await.unwrap();
    assert_eq!(breaker.snapshot().consecutive_failures, 0);

    let _ = fail(&breaker, &calls).await;
    let _ = fail(&breaker, &calls).await;
    assert_eq!(breaker.state(), CircuitState::Closed);

    let _ = fail(&breaker, &calls).await;
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_counters_never_both_non_zero() {
    let breaker = breaker(2, 3, 100);
    let calls = AtomicU32::new(0);
    let script = [false, true, false, false, true, true, false, true, true, true];

    for ok in script {
        tokio::time::advance(Duration::from_millis(100)).await;
        let _ = if ok {
            succeed(&breaker, &calls).await
        } else {
            fail(&breaker, &calls).await
        };
        let snapshot = breaker.snapshot();
        assert!(
            snapshot.consecutive_failures == 0 || snapshot.consecutive_successes == 0,
            "{snapshot:?}"
        );
    }
}

// =============================================================================
// Composition
// =============================================================================

#[test_log::test(tokio::test(start_paused = true))]
async fn test_exhausted_retries_count_as_one_breaker_failure() {
    let breaker = breaker(3, 1, 1000);
    let handler = retry_handler(4, 10, 100);
    let calls = AtomicU32::new(0);

    for outer in 1..=2u32 {
        let result: Result<(), UpstreamError> = breaker
            .execute(|| {
                handler.execute(
                    || async {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        Err(UpstreamError::Timeout(n))
                    },
                    |err| is_transient(err),
                )
            })
            .await;

        assert!(matches!(result, Err(UpstreamError::Timeout(_))));
        assert_eq!(breaker.snapshot().consecutive_failures, outer);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_shared_breaker_across_tasks() {
    let breaker = Arc::new(breaker(5, 1, 1000));
    let calls = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let breaker = Arc::clone(&breaker);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move { fail(&breaker, &calls).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }

    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}
