//! # Circuit Breaker Metrics
//!
//! Read-only snapshot of a breaker's counters. Mutated only by the owning
//! breaker on every execution outcome.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitMetrics {
    /// Current circuit breaker state
    pub state: CircuitState,

    /// Failures since the last success
    pub consecutive_failures: u64,

    /// Successes since the last failure (restarts when entering half-open)
    pub consecutive_successes: u64,

    /// Wall-clock time of the most recent failure
    pub last_failure_at: Option<DateTime<Utc>>,

    /// Wall-clock time of the most recent success
    pub last_success_at: Option<DateTime<Utc>>,

    /// Total number of calls that reached the operation
    pub total_calls: u64,

    /// Number of successful calls
    pub success_count: u64,

    /// Number of failed calls, timeouts included
    pub failure_count: u64,

    /// Number of calls that hit the per-call deadline
    pub timeout_count: u64,

    /// Number of calls rejected while open
    pub rejected_count: u64,

    /// failure_count / total_calls (0.0 when no calls were made)
    pub failure_rate: f64,
}

/// Fewer calls than this say nothing about the failure rate
const MIN_CALLS_FOR_RATE: u64 = 10;

/// Failure rate above which a closed breaker is reported unhealthy
const HEALTHY_FAILURE_RATE: f64 = 0.1;

impl CircuitMetrics {
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
            last_success_at: None,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            timeout_count: 0,
            rejected_count: 0,
            failure_rate: 0.0,
        }
    }

    /// Closed, and either too few calls to judge or a low failure rate
    pub fn is_healthy(&self) -> bool {
        match self.state {
            CircuitState::Closed => {
                self.total_calls < MIN_CALLS_FOR_RATE || self.failure_rate < HEALTHY_FAILURE_RATE
            }
            CircuitState::Open | CircuitState::HalfOpen => false,
        }
    }
}

impl Default for CircuitMetrics {
    fn default() -> Self {
        Self::new()
    }
}
