//! Proptest strategies for stream and sync types.

use cms_resilience::stream::{ChangeType, FieldChange};
use proptest::prelude::*;
use serde_json::json;

/// Small field vocabulary so generated edits overlap often
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["title", "body", "summary", "tags", "status", "slug"])
        .prop_map(str::to_string)
}

pub fn field_change_strategy() -> impl Strategy<Value = FieldChange> {
    (field_name_strategy(), any::<i64>())
        .prop_map(|(field, value)| FieldChange::update(field, json!(value)))
}

pub fn changes_strategy() -> impl Strategy<Value = Vec<FieldChange>> {
    prop::collection::vec(field_change_strategy(), 0..8)
}

pub fn change_type_strategy() -> impl Strategy<Value = ChangeType> {
    prop::sample::select(vec![
        ChangeType::Created,
        ChangeType::Updated,
        ChangeType::Deleted,
        ChangeType::Archived,
        ChangeType::Published,
        ChangeType::Restored,
        ChangeType::MediaAdded,
        ChangeType::MediaRemoved,
        ChangeType::StatusChanged,
    ])
}

pub fn item_id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}
