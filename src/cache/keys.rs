//! Cache key construction.
//!
//! Keys follow `<operation>:<params>` so that pattern invalidation can target
//! a whole family (`content:list:*`) without knowing individual parameters.

use serde_json::Value;

const ITEM_PREFIX: &str = "content:item";
const LIST_PREFIX: &str = "content:list";
const SEARCH_PREFIX: &str = "content:search";
const MEDIA_PREFIX: &str = "content:media";

/// Parameter segment for unfiltered list and search pages
const UNFILTERED: &str = "all";

/// Key for an arbitrary operation and its parameters.
///
/// Object parameters are serialized with sorted keys (serde_json's default
/// map is ordered), so logically equal parameter sets produce the same key.
pub fn cache_key(operation: &str, params: &Value) -> String {
    match params {
        Value::Null => operation.to_string(),
        Value::String(s) => format!("{operation}:{s}"),
        other => format!("{operation}:{other}"),
    }
}

/// Exact key of a single content item
pub fn item(item_id: &str) -> String {
    format!("{ITEM_PREFIX}:{item_id}")
}

/// Key of one page of the item list
pub fn item_list(params: &Value) -> String {
    family_key(LIST_PREFIX, params)
}

/// Every cached item list
pub fn item_list_pattern() -> String {
    format!("{LIST_PREFIX}:*")
}

/// Key of a search result page
pub fn search(params: &Value) -> String {
    family_key(SEARCH_PREFIX, params)
}

/// Every cached search result
pub fn search_pattern() -> String {
    format!("{SEARCH_PREFIX}:*")
}

/// Like [`cache_key`], but always with a parameter segment so the family
/// pattern matches unfiltered pages too
fn family_key(prefix: &str, params: &Value) -> String {
    match params {
        Value::Null => format!("{prefix}:{UNFILTERED}"),
        other => cache_key(prefix, other),
    }
}

/// Media attached to an item
pub fn media_list(item_id: &str) -> String {
    format!("{MEDIA_PREFIX}:{item_id}")
}
