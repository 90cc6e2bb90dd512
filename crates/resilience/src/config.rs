//! Resilience configuration for one guarded dependency

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::duration_millis;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Retry, breaker and timeout settings for one dependency
///
/// Every field has a default, so partial documents deserialize:
///
/// ```
/// use teamflow_resilience::ResilienceConfig;
///
/// let config: ResilienceConfig = serde_json::from_str(
///     r#"{"retry": {"max_attempts": 5}, "attempt_timeout": 30000}"#,
/// )
/// .unwrap();
/// assert_eq!(config.retry.max_attempts, 5);
/// assert_eq!(config.circuit_breaker.failure_threshold, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetryPolicy,

    pub circuit_breaker: CircuitBreakerConfig,

    /// Limit applied to each attempt (None = unbounded)
    #[serde(with = "duration_millis::option")]
    pub attempt_timeout: Option<Duration>,
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        if self.attempt_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::invalid(
                "attempt_timeout",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
