//! # Synchronization
//!
//! Turns stream notifications into local state: pattern cache invalidation,
//! conflict detection against cached versions and pending local edits,
//! per-item presence rosters and collaborative editing sessions.

pub mod collaboration;
pub mod conflict;
pub mod invalidation;
pub mod manager;
pub mod presence;

pub use collaboration::{CollaborationSession, Participant, SessionChange};
pub use conflict::{ConflictResolution, ConflictStrategy, ConflictType};
pub use invalidation::{invalidation_keys, InvalidationEvent};
pub use manager::SyncManager;
pub use presence::PresenceTracker;

use crate::constants::events;
use crate::stream::{CollaborationEvent, PresenceUpdate};

/// Events published by [`SyncManager`]
#[derive(Debug, Clone)]
pub enum SyncEvent {
    CacheInvalidated(InvalidationEvent),
    /// Conflict left for the user (`manual` strategy)
    ConflictDetected(ConflictResolution),
    ConflictResolved(ConflictResolution),
    PresenceChanged {
        item_id: String,
        users: Vec<PresenceUpdate>,
    },
    SessionUpdated {
        item_id: String,
        event: CollaborationEvent,
    },
    SessionClosed {
        item_id: String,
    },
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CacheInvalidated(_) => events::CACHE_INVALIDATED,
            Self::ConflictDetected(_) => events::CONFLICT_DETECTED,
            Self::ConflictResolved(_) => events::CONFLICT_RESOLVED,
            Self::PresenceChanged { .. } => events::PRESENCE_CHANGED,
            Self::SessionUpdated { .. } => events::SESSION_UPDATED,
            Self::SessionClosed { .. } => events::SESSION_CLOSED,
        }
    }
}
