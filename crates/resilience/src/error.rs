// Error types raised by the resilience layer itself
//
// Operation errors are never wrapped: retry and breaker hand them back
// unchanged. The types here are the only errors the layer introduces.

use std::time::Duration;

use thiserror::Error;

/// Raised by a [`CircuitBreaker`](crate::CircuitBreaker) that refuses to call its
/// dependency because the circuit is open and the cooldown has not elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{name}' is open (retry in {remaining:?})")]
pub struct CircuitOpenError {
    /// Name of the breaker (usually the guarded dependency)
    pub name: String,
    /// Time left before the breaker admits a probe call
    pub remaining: Duration,
}

/// Raised by [`with_timeout`](crate::with_timeout) when an attempt exceeds its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {limit:?}")]
pub struct OperationTimedOut {
    pub limit: Duration,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field is outside its allowed range
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    /// Create an invalid-field error
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
