//! Change type → cache keys.

use crate::cache::{keys, ResponseCache};
use crate::stream::ChangeType;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Record of one applied invalidation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationEvent {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub keys: Vec<String>,
    pub item_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    /// Entries actually removed
    pub removed: usize,
}

/// Keys and patterns a change invalidates
pub fn invalidation_keys(change_type: ChangeType, item_id: &str) -> Vec<String> {
    match change_type {
        ChangeType::Created => vec![keys::item_list_pattern(), keys::search_pattern()],
        ChangeType::Updated
        | ChangeType::Published
        | ChangeType::Restored
        | ChangeType::StatusChanged => vec![
            keys::item(item_id),
            keys::item_list_pattern(),
            keys::search_pattern(),
        ],
        ChangeType::Deleted | ChangeType::Archived => vec![
            keys::item(item_id),
            keys::item_list_pattern(),
            keys::search_pattern(),
            keys::media_list(item_id),
        ],
        ChangeType::MediaAdded | ChangeType::MediaRemoved => {
            vec![keys::item(item_id), keys::media_list(item_id)]
        }
    }
}

/// Invalidate every key; returns the number of entries removed
pub fn apply(cache: &ResponseCache, keys: &[String]) -> usize {
    keys.iter().map(|key| cache.invalidate_pattern(key)).sum()
}
