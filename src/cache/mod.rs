//! # Response Cache
//!
//! Short-lived in-memory cache of remote responses, keyed by operation plus
//! parameters. Shared read/write by the degradation manager (fallback
//! serving) and the sync manager (invalidation, conflict checks).
//!
//! Every entry carries its own TTL; an entry is never served once
//! `now - stored_at > ttl`. `*` in an invalidation pattern matches any run of
//! characters.

pub mod keys;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A cached response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Value,
    pub stored_at: Instant,
    pub ttl: Duration,
    pub hit_count: u64,
}

impl CacheEntry {
    /// Age of the entry
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Whether the entry has outlived its TTL
    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }

    /// The `version` field of the cached payload, when present
    pub fn version(&self) -> Option<u64> {
        self.data.get("version").and_then(Value::as_u64)
    }
}

/// Counters exposed for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// In-memory TTL cache
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    invalidations: std::sync::atomic::AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live entry's data, counting the hit; expired entries are evicted
    pub fn get(&self, key: &str) -> Option<Value> {
        use std::sync::atomic::Ordering;

        let hit = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.hit_count += 1;
                Some(entry.data.clone())
            }
            Some(_) => None,
            None => None,
        };

        match hit {
            Some(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache HIT");
                Some(data)
            }
            None => {
                // Only drop the entry if it is still the expired one we saw
                self.entries.remove_if(key, |_, entry| entry.is_expired());
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache MISS");
                None
            }
        }
    }

    /// Snapshot of a live entry without touching hit statistics
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.clone())
    }

    /// Store a value with its own TTL, replacing any previous entry
    pub fn set(&self, key: impl Into<String>, data: Value, ttl: Duration) {
        let key = key.into();
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cache SET");
        self.entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: Instant::now(),
                ttl,
                hit_count: 0,
            },
        );
    }

    /// Remove a single key; returns whether it existed
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.invalidations
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            debug!(key, "Cache DEL");
        }
        removed
    }

    /// Remove every key matching a `*` wildcard pattern; returns the number removed.
    /// Applying the same pattern twice leaves the cache as applying it once.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        if !pattern.contains('*') {
            return usize::from(self.invalidate(pattern));
        }

        let before = self.entries.len();
        self.entries.retain(|key, _| !wildcard_match(pattern, key));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.invalidations
                .fetch_add(removed as u64, std::sync::atomic::Ordering::Relaxed);
        }
        debug!(pattern, removed, "Cache pattern invalidation");
        removed
    }

    /// Evict all expired entries; returns the number evicted
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        use std::sync::atomic::Ordering;
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Glob-style match supporting only `*`
pub fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return candidate.is_empty();
    };
    let Some(mut rest) = candidate.strip_prefix(first) else {
        return false;
    };

    let segments: Vec<&str> = parts.collect();
    let Some((last, middle)) = segments.split_last() else {
        // No '*' at all: exact match
        return rest.is_empty();
    };

    for segment in middle {
        match rest.find(segment) {
            Some(index) => rest = &rest[index + segment.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::advance;

    #[test]
    fn test_wildcard_matching() {
        assert!(wildcard_match("content:list:*", "content:list:page=1"));
        assert!(wildcard_match("content:list:*", "content:list:"));
        assert!(!wildcard_match("content:list:*", "content:item:1"));
        assert!(wildcard_match("*:media", "content:42:media"));
        assert!(wildcard_match("a*b*c", "a-x-b-y-c"));
        assert!(!wildcard_match("a*b*c", "a-x-c"));
        assert!(wildcard_match("exact", "exact"));
        assert!(!wildcard_match("exact", "exactly"));
        assert!(wildcard_match("*", "anything"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_never_served() {
        let cache = ResponseCache::new();
        cache.set("content:item:1", json!({"id": "1"}), Duration::from_millis(100));

        assert_eq!(cache.get("content:item:1"), Some(json!({"id": "1"})));

        advance(Duration::from_millis(101)).await;

        assert!(cache.get("content:item:1").is_none());
        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_hit_count_and_peek() {
        let cache = ResponseCache::new();
        cache.set("k", json!({"version": 4}), Duration::from_secs(60));

        cache.get("k");
        cache.get("k");

        let entry = cache.peek("k").unwrap();
        assert_eq!(entry.hit_count, 2);
        assert_eq!(entry.version(), Some(4));
    }

    #[test]
    fn test_pattern_invalidation_is_idempotent() {
        let cache = ResponseCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("content:list:page=1", json!([]), ttl);
        cache.set("content:list:page=2", json!([]), ttl);
        cache.set("content:item:1", json!({}), ttl);

        assert_eq!(cache.invalidate_pattern("content:list:*"), 2);
        let keys_after_first: Vec<String> =
            cache.entries.iter().map(|e| e.key().clone()).collect();

        assert_eq!(cache.invalidate_pattern("content:list:*"), 0);
        let keys_after_second: Vec<String> =
            cache.entries.iter().map(|e| e.key().clone()).collect();

        assert_eq!(keys_after_first, keys_after_second);
        assert_eq!(keys_after_second, vec!["content:item:1".to_string()]);
    }

    #[test]
    fn test_exact_pattern_invalidates_single_key() {
        let cache = ResponseCache::new();
        cache.set("content:item:1", json!({}), Duration::from_secs(60));
        assert_eq!(cache.invalidate_pattern("content:item:1"), 1);
        assert!(!cache.contains_key("content:item:1"));
        assert_eq!(cache.stats().invalidations, 1);
    }
}
