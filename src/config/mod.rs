//! # Configuration System
//!
//! Typed configuration for every component. Each section derives `Default`
//! and is `#[serde(default)]`, so a file only needs the keys it overrides.
//! Durations are expressed in milliseconds and exposed as `Duration` through
//! accessor methods.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cms_resilience::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // File values, overridden by CMS_RESILIENCE__* environment variables
//! let manager = ConfigManager::load_from_file("config/cms-resilience.toml")?;
//!
//! let reset = manager.config().circuit_breaker.reset_timeout();
//! let attempts = manager.config().stream.max_reconnect_attempts;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants;
use crate::degradation::FallbackStrategy;
use crate::resilience::CircuitBreakerConfig;
use crate::sync::ConflictStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Fail-fast gate around remote operations
    pub circuit_breaker: CircuitBreakerSettings,

    /// Request deduplication and batching windows
    pub coordination: CoordinationConfig,

    /// Health classification and fallback behavior
    pub degradation: DegradationConfig,

    /// Real-time stream connection
    pub stream: StreamConfig,

    /// Cache invalidation, conflicts and collaboration
    pub sync: SyncConfig,
}

/// Circuit breaker configuration as it appears in files and env
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Per-call deadline
    pub timeout_ms: u64,
    /// Time spent open before a trial call is admitted
    pub reset_timeout_ms: u64,
}

impl CircuitBreakerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Convert into the runtime breaker configuration
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            timeout: self.timeout(),
            reset_timeout: self.reset_timeout(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: constants::breaker::DEFAULT_FAILURE_THRESHOLD,
            success_threshold: constants::breaker::DEFAULT_SUCCESS_THRESHOLD,
            timeout_ms: constants::breaker::DEFAULT_TIMEOUT_MS,
            reset_timeout_ms: constants::breaker::DEFAULT_RESET_TIMEOUT_MS,
        }
    }
}

/// Deduplication and batching configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub dedup_window_ms: u64,
    pub batch_window_ms: u64,
    pub max_batch_size: usize,
}

impl CoordinationConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: constants::coordination::DEFAULT_DEDUP_WINDOW_MS,
            batch_window_ms: constants::coordination::DEFAULT_BATCH_WINDOW_MS,
            max_batch_size: constants::coordination::DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Graceful degradation configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Error rate at or above which the service is classified degraded
    pub degradation_threshold: f64,
    /// Error rate at or above which the service is classified offline
    pub offline_threshold: f64,
    /// Maximum age of a cache entry served as a fallback
    pub cache_retention_time_ms: u64,
    /// Span of the rolling outcome window used for the error rate
    pub health_window_ms: u64,
    /// Bound on operations parked in the offline queue
    pub max_offline_queue: usize,
    /// Fallback per feature class; unknown features use `error`
    pub fallback_strategies: HashMap<String, FallbackStrategy>,
}

impl DegradationConfig {
    pub fn cache_retention_time(&self) -> Duration {
        Duration::from_millis(self.cache_retention_time_ms)
    }

    pub fn health_window(&self) -> Duration {
        Duration::from_millis(self.health_window_ms)
    }

    /// Strategy configured for a feature class
    pub fn strategy_for(&self, feature: &str) -> FallbackStrategy {
        self.fallback_strategies
            .get(feature)
            .copied()
            .unwrap_or(FallbackStrategy::Error)
    }
}

impl Default for DegradationConfig {
    fn default() -> Self {
        let fallback_strategies = HashMap::from([
            ("content_read".to_string(), FallbackStrategy::Cache),
            ("content_list".to_string(), FallbackStrategy::Cache),
            ("search".to_string(), FallbackStrategy::Cache),
            ("content_write".to_string(), FallbackStrategy::Queue),
            ("media_upload".to_string(), FallbackStrategy::Error),
        ]);

        Self {
            degradation_threshold: constants::degradation::DEFAULT_DEGRADATION_THRESHOLD,
            offline_threshold: constants::degradation::DEFAULT_OFFLINE_THRESHOLD,
            cache_retention_time_ms: constants::degradation::DEFAULT_CACHE_RETENTION_MS,
            health_window_ms: constants::degradation::DEFAULT_HEALTH_WINDOW_MS,
            max_offline_queue: constants::degradation::DEFAULT_MAX_OFFLINE_QUEUE,
            fallback_strategies,
        }
    }
}

/// Real-time stream configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Base delay before the first reconnect attempt
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Cap on a single reconnect delay
    pub max_reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Force a reconnect when a ping goes unanswered this long; unset disables
    pub heartbeat_timeout_ms: Option<u64>,
    /// Deadline for opening the connection
    pub message_timeout_ms: u64,
    /// Bound on messages queued while disconnected
    pub max_queued_messages: usize,
    /// Path appended to the API origin
    pub stream_path: String,
}

impl StreamConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat_timeout_ms.map(Duration::from_millis)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: constants::stream::DEFAULT_RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: constants::stream::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            max_reconnect_delay_ms: constants::stream::MAX_RECONNECT_DELAY_MS,
            heartbeat_interval_ms: constants::stream::DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: None,
            message_timeout_ms: constants::stream::DEFAULT_MESSAGE_TIMEOUT_MS,
            max_queued_messages: constants::stream::DEFAULT_MAX_QUEUED_MESSAGES,
            stream_path: constants::stream::DEFAULT_STREAM_PATH.to_string(),
        }
    }
}

/// Synchronization manager configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub conflict_resolution_strategy: ConflictStrategy,
    /// Delay before applying an invalidation, letting the origin write settle
    pub invalidation_delay_ms: u64,
    pub presence_stale_after_ms: u64,
    pub presence_cleanup_interval_ms: u64,
    pub max_participants: usize,
    pub max_session_events: usize,
    pub max_conflict_history: usize,
}

impl SyncConfig {
    pub fn invalidation_delay(&self) -> Duration {
        Duration::from_millis(self.invalidation_delay_ms)
    }

    pub fn presence_stale_after(&self) -> Duration {
        Duration::from_millis(self.presence_stale_after_ms)
    }

    pub fn presence_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.presence_cleanup_interval_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_resolution_strategy: ConflictStrategy::Merge,
            invalidation_delay_ms: constants::sync::DEFAULT_INVALIDATION_DELAY_MS,
            presence_stale_after_ms: constants::sync::PRESENCE_STALE_AFTER_MS,
            presence_cleanup_interval_ms: constants::sync::PRESENCE_CLEANUP_INTERVAL_MS,
            max_participants: constants::sync::DEFAULT_MAX_PARTICIPANTS,
            max_session_events: constants::sync::DEFAULT_MAX_SESSION_EVENTS,
            max_conflict_history: constants::sync::DEFAULT_MAX_CONFLICT_HISTORY,
        }
    }
}

impl ResilienceConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.circuit_breaker
            .to_breaker_config()
            .validate()
            .map_err(|reason| {
                ConfigurationError::invalid_value(
                    "circuit_breaker",
                    format!("{:?}", self.circuit_breaker),
                    reason,
                )
            })?;

        let degradation = &self.degradation;
        for (field, value) in [
            ("degradation.degradation_threshold", degradation.degradation_threshold),
            ("degradation.offline_threshold", degradation.offline_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value.to_string(),
                    "error-rate thresholds must be within [0, 1]",
                ));
            }
        }

        if degradation.degradation_threshold > degradation.offline_threshold {
            return Err(ConfigurationError::invalid_value(
                "degradation.degradation_threshold",
                degradation.degradation_threshold.to_string(),
                "must not exceed offline_threshold",
            ));
        }

        if degradation.health_window_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "degradation.health_window_ms",
                "0",
                "health window must be greater than 0",
            ));
        }

        if self.coordination.max_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "coordination.max_batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        let stream = &self.stream;
        if stream.reconnect_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "stream.reconnect_interval_ms",
                "0",
                "reconnect interval must be greater than 0",
            ));
        }

        if stream.max_reconnect_delay_ms < stream.reconnect_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "stream.max_reconnect_delay_ms",
                stream.max_reconnect_delay_ms.to_string(),
                "cap must be at least reconnect_interval_ms",
            ));
        }

        if stream.heartbeat_interval_ms == 0 || stream.message_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "stream.heartbeat_interval_ms/message_timeout_ms",
                "0",
                "stream intervals must be greater than 0",
            ));
        }

        if !stream.stream_path.starts_with('/') {
            return Err(ConfigurationError::invalid_value(
                "stream.stream_path",
                stream.stream_path.clone(),
                "path must start with '/'",
            ));
        }

        if self.sync.max_participants == 0 {
            return Err(ConfigurationError::invalid_value(
                "sync.max_participants",
                "0",
                "participant cap must be greater than 0",
            ));
        }

        if self.sync.presence_cleanup_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "sync.presence_cleanup_interval_ms",
                "0",
                "cleanup interval must be greater than 0",
            ));
        }

        Ok(())
    }
}
