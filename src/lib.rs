#![allow(clippy::doc_markdown)] // Allow technical terms like WebSocket, TTL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # CMS Resilience
//!
//! Client-side resilience and real-time synchronization for applications that
//! talk to a remote content-management API.
//!
//! ## Overview
//!
//! Remote calls pass through a small stack of cooperating components:
//!
//! - [`coordination`] - identical concurrent calls are collapsed and per-item
//!   fetches are grouped into batch calls
//! - [`degradation`] - failures fall back to cached data, an offline queue or
//!   a plain error, depending on the feature; service health is tracked from
//!   the rolling error rate
//! - [`resilience`] - a circuit breaker that fails fast while the API is down
//! - [`cache`] - the shared response cache with TTLs and wildcard invalidation
//!
//! Alongside, a persistent event stream keeps local state current:
//!
//! - [`stream`] - authenticated connection with heartbeat, exponential
//!   backoff reconnection, subscription replay and an outbound queue
//! - [`sync`] - cache invalidation from change notifications, conflict
//!   detection and resolution, presence and collaborative sessions
//!
//! [`stack::ResilienceStack`] wires one instance of each together.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cms_resilience::config::ConfigManager;
//! use cms_resilience::stream::{StaticCredentials, WebSocketTransport};
//! use cms_resilience::ResilienceStack;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! cms_resilience::logging::init_structured_logging();
//!
//! let manager = ConfigManager::load()?;
//! let stack = ResilienceStack::new(
//!     manager.config().clone(),
//!     "https://cms.example.com",
//!     Arc::new(WebSocketTransport::new()),
//!     Arc::new(StaticCredentials::new("access-token")),
//! )?;
//! stack.start().await?;
//!
//! let item = stack
//!     .execute::<serde_json::Value, _, _>("content:item:42", "content_read", || async {
//!         Ok(serde_json::json!({ "id": "42", "version": 1 }))
//!     })
//!     .await?;
//! println!("from cache: {}", item.from_cache);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod coordination;
pub mod degradation;
pub mod error;
pub mod events;
pub mod logging;
pub mod resilience;
pub mod stack;
pub mod stream;
pub mod sync;

pub use cache::{CacheEntry, ResponseCache};
pub use config::{ConfigManager, ResilienceConfig};
pub use coordination::{BatchCoordinator, RequestDeduplicator};
pub use degradation::{
    DegradedResponse, FallbackStrategy, GracefulDegradationManager, ServiceHealth, ServiceStatus,
};
pub use error::{ResilienceError, Result};
pub use events::{EventPublisher, PublishedEvent};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use stack::ResilienceStack;
pub use stream::{ConnectionState, StreamClient, StreamEvent, StreamMessage};
pub use sync::{ConflictStrategy, SyncEvent, SyncManager};
