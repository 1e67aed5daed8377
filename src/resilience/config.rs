//! Runtime parameters of one breaker.
//!
//! File and environment configuration lives in
//! `crate::config::CircuitBreakerSettings`, which converts into this type.

use crate::constants::breaker;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest reset timeout accepted; beyond this a breaker is effectively stuck open
const MAX_RESET_TIMEOUT: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `closed` that open the circuit
    pub failure_threshold: u32,

    /// Consecutive successes in `half_open` that close it again
    pub success_threshold: u32,

    /// Per-call deadline; running past it counts as a failure
    pub timeout: Duration,

    /// Time spent `open` before a trial call is admitted
    pub reset_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Slow, large uploads: generous deadline, quicker to trip and to retry
    pub fn for_media_uploads() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            timeout: Duration::from_secs(120),
            reset_timeout: Duration::from_secs(30),
        }
    }

    /// Reject thresholds of zero, zero durations and reset timeouts over an hour
    pub fn validate(&self) -> Result<(), String> {
        let problem = if self.failure_threshold == 0 {
            Some("failure_threshold must be at least 1".to_string())
        } else if self.success_threshold == 0 {
            Some("success_threshold must be at least 1".to_string())
        } else if self.timeout.is_zero() {
            Some("timeout must be non-zero".to_string())
        } else if self.reset_timeout.is_zero() {
            Some("reset_timeout must be non-zero".to_string())
        } else if self.reset_timeout > MAX_RESET_TIMEOUT {
            Some(format!(
                "reset_timeout must not exceed {}s",
                MAX_RESET_TIMEOUT.as_secs()
            ))
        } else {
            None
        };

        problem.map_or(Ok(()), Err)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: breaker::DEFAULT_FAILURE_THRESHOLD,
            success_threshold: breaker::DEFAULT_SUCCESS_THRESHOLD,
            timeout: Duration::from_millis(breaker::DEFAULT_TIMEOUT_MS),
            reset_timeout: Duration::from_millis(breaker::DEFAULT_RESET_TIMEOUT_MS),
        }
    }
}
