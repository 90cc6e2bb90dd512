//! Retry policy and handler

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::duration_millis;
use crate::error::ConfigError;

/// Backoff configuration for retried operations
///
/// The schedule is deterministic: no jitter is applied.
///
/// # Example
///
/// ```
/// use teamflow_resilience::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(5)
///     .with_initial_delay(Duration::from_millis(100))
///     .with_max_delay(Duration::from_secs(1));
///
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(100));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(200));
/// assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(400));
/// assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial)
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Growth factor applied per subsequent retry (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Create an exponential backoff retry policy with sensible defaults
    ///
    /// - 3 max attempts
    /// - 1 second initial delay
    /// - 10 second max delay
    /// - 2x backoff multiplier
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fixed delays (no backoff)
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay before the first retry
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay to wait before the given attempt (1-based)
    ///
    /// Attempt 1 runs immediately. Attempt `n >= 2` waits
    /// `min(max_delay, initial_delay * backoff_multiplier^(n-2))`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let base_nanos =
            self.initial_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);

        // powi overflows to infinity for long schedules; clamp before converting
        if !base_nanos.is_finite() || base_nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(base_nanos.round() as u64)
    }

    /// Check if there are remaining attempts after `current_attempt` (1-based)
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }

    /// Validate the policy ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::invalid(
                "max_delay",
                format!(
                    "{:?} is shorter than initial_delay {:?}",
                    self.max_delay, self.initial_delay
                ),
            ));
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(ConfigError::invalid(
                "backoff_multiplier",
                format!("{} is not a finite value >= 1.0", self.backoff_multiplier),
            ));
        }
        Ok(())
    }
}

/// Executes operations under a [`RetryPolicy`]
///
/// Each retry re-runs the operation in full. Only mark errors retryable when
/// repeating the operation is safe.
#[derive(Debug, Clone, Default)]
pub struct RetryHandler {
    policy: RetryPolicy,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with an error `is_retryable`
    /// rejects, or `max_attempts` is reached.
    ///
    /// The error returned is the last one the operation produced, unchanged.
    pub async fn execute<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.policy.has_attempts_remaining(attempt) || !is_retryable(&err) {
                        return Err(err);
                    }

                    attempt += 1;
                    let delay = self.policy.delay_for_attempt(attempt);
                    debug!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying operation"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
