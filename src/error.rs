//! # Error Handling
//!
//! Crate-wide error taxonomy. `ResilienceError` is `Clone` so a single outcome
//! can be fanned out to every waiter attached to a deduplicated call or a batch.

use crate::resilience::CircuitState;
use std::time::Duration;

/// Errors surfaced by the resilience and synchronization layers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResilienceError {
    /// The circuit breaker rejected the call without invoking the operation
    #[error(
        "Service temporarily unavailable ({component} circuit is {state:?}), retry after {} seconds",
        retry_after.as_secs().max(1)
    )]
    CircuitOpen {
        component: String,
        state: CircuitState,
        retry_after: Duration,
    },

    /// An operation or connection attempt exceeded its deadline
    #[error("{operation} timed out after {}ms", timeout.as_millis())]
    Timeout { operation: String, timeout: Duration },

    /// An item id was absent from a grouped batch result
    #[error("Item '{item_id}' not found in batch result for '{batch_key}'")]
    NotFoundInBatch { batch_key: String, item_id: String },

    /// Transport-level failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed stream message
    #[error("Parse error: {0}")]
    Parse(String),

    /// The remote side explicitly reported an error frame
    #[error("Server error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Server {
        code: Option<String>,
        message: String,
    },

    /// No valid credential was available
    #[error("Authentication unavailable: {0}")]
    Unauthenticated(String),

    /// Opaque failure reported by a wrapped remote operation
    #[error("Operation failed: {0}")]
    Operation(String),

    /// Invalid runtime configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ResilienceError {
    /// Shorthand for an opaque operation failure
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }

    /// Whether the failure came from the breaker refusing the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Whether a caller may reasonably retry later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. } | Self::Timeout { .. } | Self::Connection(_)
        )
    }
}

impl From<serde_json::Error> for ResilienceError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

impl From<url::ParseError> for ResilienceError {
    fn from(error: url::ParseError) -> Self {
        Self::Configuration(format!("invalid stream url: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, ResilienceError>;
