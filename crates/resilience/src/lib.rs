//! # Teamflow Resilience
//!
//! Failure-handling primitives for calls into flaky dependencies (agent
//! model turns, storage backends, tool executors).
//!
//! ## Features
//!
//! - **Retries**: [`RetryHandler`] re-runs an operation with deterministic
//!   exponential backoff while a caller-supplied predicate says the error is transient
//! - **Circuit breaking**: [`CircuitBreaker`] sheds load from a dependency that keeps
//!   failing and probes recovery after a cooldown
//! - **Timeouts**: [`with_timeout`] bounds a single attempt
//! - **Composition**: [`ResilientCall`] layers all three
//!
//! ## Composition
//!
//! ```text
//! ResilientCall::execute
//!   └─ CircuitBreaker::execute        (one check, one outcome per call)
//!        └─ RetryHandler::execute     (up to max_attempts)
//!             └─ with_timeout         (optional, per attempt)
//!                  └─ operation()
//! ```
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use teamflow_resilience::{
//!     CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, RetryHandler, RetryPolicy,
//! };
//!
//! #[derive(Debug)]
//! enum CallError {
//!     Unavailable,
//!     Open(CircuitOpenError),
//! }
//!
//! impl From<CircuitOpenError> for CallError {
//!     fn from(err: CircuitOpenError) -> Self {
//!         CallError::Open(err)
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::new("storage", CircuitBreakerConfig::default());
//! let retry = RetryHandler::new(
//!     RetryPolicy::exponential().with_initial_delay(Duration::from_millis(1)),
//! );
//!
//! let value: Result<u32, CallError> = breaker
//!     .execute(|| retry.execute(|| async { Ok(7) }, |_: &CallError| true))
//!     .await;
//! assert_eq!(value.unwrap(), 7);
//! # let _ = CallError::Unavailable;
//! # }
//! ```

pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod error;
pub mod resilient;
pub mod retry;
pub mod timeout;

mod duration_millis;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitSnapshot, CircuitState,
};
pub use classify::{is_transient, is_transient_message, Transient};
pub use config::ResilienceConfig;
pub use error::{CircuitOpenError, ConfigError, OperationTimedOut};
pub use resilient::ResilientCall;
pub use retry::{RetryHandler, RetryPolicy};
pub use timeout::with_timeout;
