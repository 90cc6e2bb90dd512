//! Breaker + retry + timeout composed for one dependency

use std::future::Future;
use std::time::Duration;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::ResilienceConfig;
use crate::error::{CircuitOpenError, OperationTimedOut};
use crate::retry::RetryHandler;
use crate::timeout::with_timeout;

/// Guarded call path for one downstream dependency
///
/// The breaker is consulted once per [`execute`](Self::execute) and records one
/// outcome for it: a call that succeeds after retries is a breaker success, a
/// call that exhausts its retries is a single breaker failure.
#[derive(Debug)]
pub struct ResilientCall {
    breaker: CircuitBreaker,
    retry: RetryHandler,
    attempt_timeout: Option<Duration>,
}

impl ResilientCall {
    pub fn new(breaker: CircuitBreaker, retry: RetryHandler) -> Self {
        Self {
            breaker,
            retry,
            attempt_timeout: None,
        }
    }

    /// Build from configuration; `name` identifies the dependency in errors and logs
    pub fn from_config(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(name, config.circuit_breaker.clone()),
            retry: RetryHandler::new(config.retry.clone()),
            attempt_timeout: config.attempt_timeout,
        }
    }

    /// Bound every attempt; an expired attempt fails with [`OperationTimedOut`]
    pub fn with_attempt_timeout(mut self, limit: Duration) -> Self {
        self.attempt_timeout = Some(limit);
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn retry(&self) -> &RetryHandler {
        &self.retry
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub async fn execute<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: From<CircuitOpenError> + From<OperationTimedOut>,
    {
        let attempt_timeout = self.attempt_timeout;
        let retry = &self.retry;

        let attempt = move || {
            let attempt = operation();
            async move {
                match attempt_timeout {
                    Some(limit) => with_timeout(limit, attempt).await,
                    None => attempt.await,
                }
            }
        };

        self.breaker
            .execute(move || retry.execute(attempt, is_retryable))
            .await
    }
}
