//! Per-item presence roster.

use crate::stream::{PresenceStatus, PresenceUpdate};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct PresenceEntry {
    update: PresenceUpdate,
    last_seen: Instant,
}

/// Last-known presence per user for one item
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    item_id: String,
    max_participants: usize,
    users: HashMap<String, PresenceEntry>,
}

impl PresenceTracker {
    pub fn new(item_id: impl Into<String>, max_participants: usize) -> Self {
        Self {
            item_id: item_id.into(),
            max_participants,
            users: HashMap::new(),
        }
    }

    /// Apply an update; returns whether the roster changed
    pub fn update(&mut self, update: PresenceUpdate) -> bool {
        if update.status == PresenceStatus::Offline {
            return self.users.remove(&update.user_id).is_some();
        }

        if !self.users.contains_key(&update.user_id) && self.users.len() >= self.max_participants {
            warn!(
                item_id = %self.item_id,
                user_id = %update.user_id,
                max_participants = self.max_participants,
                "Presence roster full, ignoring new participant"
            );
            return false;
        }

        self.users.insert(
            update.user_id.clone(),
            PresenceEntry {
                update,
                last_seen: Instant::now(),
            },
        );
        true
    }

    /// Drop users not heard from within `stale_after`; returns their ids
    pub fn evict_stale(&mut self, stale_after: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        self.users.retain(|user_id, entry| {
            let stale = entry.last_seen.elapsed() > stale_after;
            if stale {
                evicted.push(user_id.clone());
            }
            !stale
        });
        if !evicted.is_empty() {
            debug!(item_id = %self.item_id, evicted = evicted.len(), "Stale presence evicted");
        }
        evicted
    }

    /// Active users ordered by user id
    pub fn active_users(&self) -> Vec<PresenceUpdate> {
        let mut users: Vec<PresenceUpdate> =
            self.users.values().map(|entry| entry.update.clone()).collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
