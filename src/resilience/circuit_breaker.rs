//! # Circuit Breaker Implementation
//!
//! Fail-fast gate around a single remote operation type. Classic three-state
//! machine: Closed (normal operation), Open (failing fast) and Half-Open
//! (trial calls testing recovery).
//!
//! Deadlines are measured with `tokio::time::Instant`, so a paused test
//! runtime can drive the reset timer deterministically.

use crate::error::ResilienceError;
use crate::resilience::{CircuitBreakerConfig, CircuitMetrics};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - trial calls are allowed through
    HalfOpen,
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is {state:?} for {component}, retry in {}ms", retry_after.as_millis())]
    CircuitOpen {
        component: String,
        state: CircuitState,
        retry_after: Duration,
    },

    /// Operation exceeded the per-call deadline and was recorded as a failure
    #[error("Operation on {component} timed out after {}ms", timeout.as_millis())]
    Timeout { component: String, timeout: Duration },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl From<CircuitBreakerError<ResilienceError>> for ResilienceError {
    fn from(error: CircuitBreakerError<ResilienceError>) -> Self {
        match error {
            CircuitBreakerError::CircuitOpen {
                component,
                state,
                retry_after,
            } => ResilienceError::CircuitOpen {
                component,
                state,
                retry_after,
            },
            CircuitBreakerError::Timeout { component, timeout } => ResilienceError::Timeout {
                operation: component,
                timeout,
            },
            CircuitBreakerError::OperationFailed(inner) => inner,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    opened_at: Option<Instant>,
    metrics: CircuitMetrics,
}

/// Core circuit breaker; every transition happens under one short-lived lock
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                opened_at: None,
                metrics: CircuitMetrics::new(),
            }),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(retry_after) = self.acquire_permission() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
                state: CircuitState::Open,
                retry_after,
            });
        }

        let start_time = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, operation()).await;
        let duration = start_time.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                self.record_success(duration);
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure(duration, false);
                Err(CircuitBreakerError::OperationFailed(error))
            }
            Err(_) => {
                self.record_failure(duration, true);
                Err(CircuitBreakerError::Timeout {
                    component: self.name.clone(),
                    timeout: self.config.timeout,
                })
            }
        }
    }

    /// Decide whether a call may proceed; `Err` carries the remaining reset time
    fn acquire_permission(&self) -> Result<(), Duration> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let Some(opened_at) = inner.opened_at else {
                    warn!(component = %self.name, "Circuit open but no timestamp recorded");
                    return Ok(());
                };

                let elapsed = opened_at.elapsed();
                if elapsed >= self.config.reset_timeout {
                    self.transition_to_half_open(&mut inner);
                    Ok(())
                } else {
                    inner.metrics.rejected_count += 1;
                    let remaining = self.config.reset_timeout - elapsed;
                    debug!(
                        component = %self.name,
                        retry_after_ms = remaining.as_millis() as u64,
                        "Circuit open, rejecting call"
                    );
                    Err(remaining)
                }
            }
        }
    }

    /// Record a successful operation
    fn record_success(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;
        inner.metrics.consecutive_failures = 0;
        inner.metrics.consecutive_successes += 1;
        inner.metrics.last_success_at = Some(Utc::now());

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation succeeded"
        );

        match inner.state {
            CircuitState::HalfOpen => {
                if inner.metrics.consecutive_successes >= u64::from(self.config.success_threshold) {
                    self.transition_to_closed(&mut inner);
                }
            }
            CircuitState::Closed => {}
            CircuitState::Open => {
                // A call admitted before another caller tripped the breaker.
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation
    fn record_failure(&self, duration: Duration, timed_out: bool) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;
        if timed_out {
            inner.metrics.timeout_count += 1;
        }
        inner.metrics.consecutive_successes = 0;
        inner.metrics.consecutive_failures += 1;
        inner.metrics.last_failure_at = Some(Utc::now());

        error!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            timed_out,
            "Operation failed"
        );

        match inner.state {
            CircuitState::Closed => {
                if inner.metrics.consecutive_failures >= u64::from(self.config.failure_threshold) {
                    self.transition_to_open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state immediately reopens the circuit
                self.transition_to_open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn transition_to_closed(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.metrics.consecutive_failures = 0;

        info!(
            component = %self.name,
            total_calls = inner.metrics.total_calls,
            "Circuit breaker closed (recovered)"
        );
    }

    fn transition_to_open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.metrics.consecutive_successes = 0;

        error!(
            component = %self.name,
            consecutive_failures = inner.metrics.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
            "Circuit breaker opened (failing fast)"
        );
    }

    fn transition_to_half_open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::HalfOpen;
        inner.metrics.consecutive_successes = 0;

        info!(
            component = %self.name,
            success_threshold = self.config.success_threshold,
            "Circuit breaker half-open (testing recovery)"
        );
    }

    /// Force the circuit closed and zero all counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.metrics = CircuitMetrics::new();
        info!(component = %self.name, "Circuit breaker reset");
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.transition_to_open(&mut inner);
    }

    /// Remaining time before an open circuit admits a trial call
    pub fn time_until_retry(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                Some(self.config.reset_timeout.saturating_sub(opened_at.elapsed()))
            }
            _ => None,
        }
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitMetrics {
        let inner = self.inner.lock();
        let mut snapshot = inner.metrics.clone();
        snapshot.state = inner.state;
        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
        }
        snapshot
    }

    /// Closed with a low failure rate
    pub fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }
}
