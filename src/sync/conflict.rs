//! Conflict detection and resolution.
//!
//! Merge is flat field-level last-writer-wins: remote changes are kept as-is
//! and local changes survive only on fields the remote side did not touch.

use crate::stream::{ContentChangeNotification, FieldChange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

/// Policy applied when local and remote views of an item disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    LocalWins,
    RemoteWins,
    Merge,
    Manual,
}

impl ConflictStrategy {
    /// Unknown names fall back to `Manual`, so a bad setting never breaks sync
    pub fn from_name(name: &str) -> Self {
        match name {
            "local_wins" => Self::LocalWins,
            "remote_wins" => Self::RemoteWins,
            "merge" => Self::Merge,
            "manual" => Self::Manual,
            other => {
                warn!(strategy = other, "Unknown conflict resolution strategy, using manual");
                Self::Manual
            }
        }
    }
}

impl<'de> Deserialize<'de> for ConflictStrategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    VersionMismatch,
    ConcurrentEdit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub conflict_id: Uuid,
    pub item_id: String,
    pub conflict_type: ConflictType,
    pub local_changes: Vec<FieldChange>,
    pub remote_changes: Vec<FieldChange>,
    pub strategy: ConflictStrategy,
    /// Empty for `manual`
    pub resolved_changes: Vec<FieldChange>,
    pub cached_version: Option<u64>,
    pub remote_version: u64,
    pub resolved: bool,
    pub detected_at: DateTime<Utc>,
}

/// Classify a notification against the cached version and pending local edits.
/// Version disagreement takes precedence over concurrent edits.
pub fn detect(
    cached_version: Option<u64>,
    notification: &ContentChangeNotification,
    local_changes: &[FieldChange],
) -> Option<ConflictType> {
    match cached_version {
        Some(version) if version != notification.version => Some(ConflictType::VersionMismatch),
        _ if !local_changes.is_empty() => Some(ConflictType::ConcurrentEdit),
        _ => None,
    }
}

/// Changes to apply under `strategy`; `None` when the conflict is left to the user
pub fn resolve(
    strategy: ConflictStrategy,
    local: &[FieldChange],
    remote: &[FieldChange],
) -> Option<Vec<FieldChange>> {
    match strategy {
        ConflictStrategy::LocalWins => Some(local.to_vec()),
        ConflictStrategy::RemoteWins => Some(remote.to_vec()),
        ConflictStrategy::Merge => Some(merge(local, remote)),
        ConflictStrategy::Manual => None,
    }
}

/// Remote changes first, then local changes on fields the remote left alone
pub fn merge(local: &[FieldChange], remote: &[FieldChange]) -> Vec<FieldChange> {
    let remote_fields: HashSet<&str> = remote.iter().map(|c| c.field.as_str()).collect();
    remote
        .iter()
        .chain(local.iter().filter(|c| !remote_fields.contains(c.field.as_str())))
        .cloned()
        .collect()
}

/// Build the resolution record for a detected conflict
pub fn build_resolution(
    conflict_type: ConflictType,
    strategy: ConflictStrategy,
    cached_version: Option<u64>,
    notification: &ContentChangeNotification,
    local_changes: Vec<FieldChange>,
) -> ConflictResolution {
    let resolved = resolve(strategy, &local_changes, &notification.changes);
    ConflictResolution {
        conflict_id: Uuid::new_v4(),
        item_id: notification.item_id.clone(),
        conflict_type,
        remote_changes: notification.changes.clone(),
        local_changes,
        strategy,
        resolved: resolved.is_some(),
        resolved_changes: resolved.unwrap_or_default(),
        cached_version,
        remote_version: notification.version,
        detected_at: Utc::now(),
    }
}
