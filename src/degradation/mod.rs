//! # Graceful Degradation
//!
//! Keeps callers productive while the remote service struggles. Every call
//! runs through the circuit breaker; successes refresh the response cache and
//! failures fall back according to the feature's [`FallbackStrategy`]:
//!
//! | Strategy | On failure                                        |
//! |----------|---------------------------------------------------|
//! | `cache`  | serve a cached response younger than retention    |
//! | `queue`  | park the write in the offline queue               |
//! | `error`  | propagate the original failure                    |
//!
//! Health is classified from the error rate over a rolling window and every
//! status change is announced to registered listeners.

pub mod health;
pub mod manager;

pub use health::{classify, ServiceHealth, ServiceStatus};
pub use manager::{GracefulDegradationManager, HealthListener, ListenerId};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Behavior of a feature class when its remote call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategy {
    Cache,
    Queue,
    Error,
}

/// Outcome of a degradation-aware call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedResponse<T> {
    /// `None` when the call was queued for later
    pub data: Option<T>,
    pub from_cache: bool,
    pub offline: bool,
    pub degraded: bool,
}

impl<T> DegradedResponse<T> {
    pub fn fresh(data: T) -> Self {
        Self {
            data: Some(data),
            from_cache: false,
            offline: false,
            degraded: false,
        }
    }

    pub fn cached(data: T) -> Self {
        Self {
            data: Some(data),
            from_cache: true,
            offline: false,
            degraded: true,
        }
    }

    pub fn queued() -> Self {
        Self {
            data: None,
            from_cache: false,
            offline: true,
            degraded: true,
        }
    }
}

/// A write parked while the service was unreachable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedOperation {
    pub id: Uuid,
    pub feature: String,
    pub cache_key: String,
    /// Failure that caused the operation to be queued
    pub reason: String,
    pub queued_at: DateTime<Utc>,
}
