//! Circuit breaker
//!
//! Guards one downstream dependency. While the circuit is open, calls fail
//! fast with [`CircuitOpenError`] and the dependency is not touched.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::duration_millis;
use crate::error::{CircuitOpenError, ConfigError};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls allowed
    Closed,

    /// Failure threshold reached - calls rejected until the cooldown elapses
    Open,

    /// Cooldown elapsed - calls allowed to probe recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration
///
/// # State Machine
///
/// ```text
/// ┌─────────┐  failure_threshold  ┌─────────┐    cooldown     ┌──────────┐
/// │ Closed  │ ──────────────────► │  Open   │ ──────────────► │ HalfOpen │
/// └─────────┘                     └─────────┘                 └──────────┘
///      ▲                               ▲          any failure       │
///      │                               └────────────────────────────┤
///      │              success_threshold                             │
///      └────────────────────────────────────────────────────────────┘
/// ```
///
/// # Example
///
/// ```
/// use teamflow_resilience::CircuitBreakerConfig;
/// use std::time::Duration;
///
/// let config = CircuitBreakerConfig::default()
///     .with_failure_threshold(3)
///     .with_cooldown(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while closed) that open the circuit
    pub failure_threshold: u32,

    /// Consecutive successes (while half-open) that close the circuit
    pub success_threshold: u32,

    /// Time the circuit stays open before admitting a probe
    #[serde(with = "duration_millis")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold to open the circuit
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the success threshold to close the circuit
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the cooldown (time before trying again after opening)
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold < 1 {
            return Err(ConfigError::invalid(
                "failure_threshold",
                "must be at least 1",
            ));
        }
        if self.success_threshold < 1 {
            return Err(ConfigError::invalid(
                "success_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of a breaker's state and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// Bumped on every state transition; permits from an older phase are ignored
    generation: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            generation: 0,
        }
    }

    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.opened_at = (state == CircuitState::Open).then(Instant::now);
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Three-state circuit breaker
///
/// State checks and transitions happen under a mutex that is released before
/// the guarded operation is awaited, so a breaker can be shared across tasks
/// behind an `Arc`.
///
/// # Example
///
/// ```
/// use teamflow_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, CircuitState};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let breaker = CircuitBreaker::new("team-storage", CircuitBreakerConfig::default());
///
/// let result: Result<&str, CircuitOpenError> = breaker.execute(|| async { Ok("ok") }).await;
/// assert_eq!(result.unwrap(), "ok");
/// assert_eq!(breaker.state(), CircuitState::Closed);
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Name of the guarded dependency (used in errors and logs)
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the closed state
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state
    ///
    /// An open breaker whose cooldown has elapsed still reports `Open` until
    /// the next call moves it to half-open.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
        }
    }

    /// Run `operation` through the breaker
    ///
    /// Returns `E::from(CircuitOpenError)` without invoking `operation` while the
    /// circuit is open. Otherwise the operation's own result is returned
    /// unchanged after the outcome is recorded.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let permit = self.allow()?;

        match operation().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(err) => {
                permit.failure();
                Err(err)
            }
        }
    }

    /// Ask to make one call
    ///
    /// Returns a permit that must be used to report success/failure. A permit
    /// dropped without a report leaves the breaker untouched.
    pub fn allow(&self) -> Result<CircuitPermit<'_>, CircuitOpenError> {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .opened_at
                .map(|opened_at| opened_at.elapsed())
                .unwrap_or(Duration::ZERO);

            if elapsed < self.config.cooldown {
                return Err(CircuitOpenError {
                    name: self.name.clone(),
                    remaining: self.config.cooldown - elapsed,
                });
            }

            inner.transition(CircuitState::HalfOpen);
            info!(breaker = %self.name, "circuit breaker half-open, probing recovery");
        }

        Ok(CircuitPermit {
            breaker: self,
            generation: inner.generation,
        })
    }

    /// Force the breaker back to closed with cleared counters
    pub fn reset(&self) {
        self.inner.lock().transition(CircuitState::Closed);
        info!(breaker = %self.name, "circuit breaker reset");
    }

    fn record_success(&self, generation: u64) {
        let mut inner = self.inner.lock();
        // Issued before the last transition
        if inner.generation != generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.transition(CircuitState::Closed);
                    info!(breaker = %self.name, "circuit breaker closed, normal operation resumed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    let failures = inner.consecutive_failures;
                    inner.transition(CircuitState::Open);
                    warn!(
                        breaker = %self.name,
                        failures,
                        cooldown_ms = u64::try_from(self.config.cooldown.as_millis()).unwrap_or(u64::MAX),
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.transition(CircuitState::Open);
                warn!(breaker = %self.name, "circuit breaker reopened, probe failed");
            }
            CircuitState::Open => {}
        }
    }
}

/// Permit that must be held during a protected call
#[must_use = "report the call outcome with success() or failure()"]
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
}

impl CircuitPermit<'_> {
    /// Report the call succeeded
    pub fn success(self) {
        self.breaker.record_success(self.generation);
    }

    /// Report the call failed
    pub fn failure(self) {
        self.breaker.record_failure(self.generation);
    }
}
