//! # System Constants
//!
//! Defaults and fixed limits shared across the resilience and synchronization
//! layers. Every tunable here has a matching configuration field.

/// Event names published on the sync event channel
pub mod events {
    pub const CACHE_INVALIDATED: &str = "cache.invalidated";
    pub const CONFLICT_DETECTED: &str = "sync.conflict_detected";
    pub const CONFLICT_RESOLVED: &str = "sync.conflict_resolved";
    pub const PRESENCE_CHANGED: &str = "sync.presence_changed";
    pub const SESSION_UPDATED: &str = "sync.session_updated";
    pub const SESSION_CLOSED: &str = "sync.session_closed";
}

/// Stream client defaults
pub mod stream {
    /// Base reconnect interval; doubled per attempt
    pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1_000;
    /// Upper bound on any single reconnect delay
    pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;
    pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
    pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
    pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_MAX_QUEUED_MESSAGES: usize = 1_000;
    /// Path appended to the API origin for the real-time endpoint
    pub const DEFAULT_STREAM_PATH: &str = "/realtime";
    /// Query parameter carrying the access token
    pub const TOKEN_QUERY_PARAM: &str = "token";
    /// Close code of a normal, intentional close
    pub const NORMAL_CLOSE_CODE: u16 = 1000;
    /// Number of pong samples in the rolling latency average
    pub const LATENCY_SAMPLE_WINDOW: usize = 10;
    /// Capacity of the typed event broadcast channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;
}

/// Circuit breaker defaults
pub mod breaker {
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 60_000;
}

/// Graceful degradation defaults
pub mod degradation {
    pub const DEFAULT_DEGRADATION_THRESHOLD: f64 = 0.3;
    pub const DEFAULT_OFFLINE_THRESHOLD: f64 = 0.8;
    pub const DEFAULT_CACHE_RETENTION_MS: u64 = 5 * 60 * 1_000;
    pub const DEFAULT_HEALTH_WINDOW_MS: u64 = 60_000;
    pub const DEFAULT_MAX_OFFLINE_QUEUE: usize = 500;
}

/// Dedup/batch defaults
pub mod coordination {
    pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 100;
    pub const DEFAULT_BATCH_WINDOW_MS: u64 = 50;
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
}

/// Sync manager defaults
pub mod sync {
    pub const DEFAULT_INVALIDATION_DELAY_MS: u64 = 0;
    pub const PRESENCE_STALE_AFTER_MS: u64 = 5 * 60 * 1_000;
    pub const PRESENCE_CLEANUP_INTERVAL_MS: u64 = 60_000;
    pub const DEFAULT_MAX_PARTICIPANTS: usize = 50;
    pub const DEFAULT_MAX_SESSION_EVENTS: usize = 500;
    pub const DEFAULT_MAX_CONFLICT_HISTORY: usize = 100;
    /// Source tag on invalidations driven by stream notifications
    pub const REALTIME_SOURCE: &str = "realtime";
}
