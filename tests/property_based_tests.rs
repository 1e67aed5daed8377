mod common;

use cms_resilience::cache::{keys, ResponseCache};
use cms_resilience::coordination::RequestDeduplicator;
use cms_resilience::stream::reconnect_delay;
use cms_resilience::sync::{conflict, invalidation};
use common::strategies::*;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

proptest! {
    /// Property: reconnect delays never shrink between attempts and never exceed the cap
    #[test]
    fn reconnect_delay_is_monotonic_and_capped(
        base_ms in 1u64..5_000,
        cap_ms in 1u64..120_000,
        attempts in 1u32..64,
    ) {
        let base = Duration::from_millis(base_ms);
        let cap = Duration::from_millis(cap_ms);
        let mut previous = Duration::ZERO;
        for attempt in 1..=attempts {
            let delay = reconnect_delay(base, attempt, cap);
            prop_assert!(delay <= cap);
            prop_assert!(delay >= previous);
            previous = delay;
        }
        prop_assert_eq!(reconnect_delay(base, 1, cap), base.min(cap));
    }

    /// Property: merge keeps every remote change and no local change on a remote-touched field
    #[test]
    fn merge_prefers_remote_fields(local in changes_strategy(), remote in changes_strategy()) {
        let merged = conflict::merge(&local, &remote);
        let remote_fields: HashSet<&str> = remote.iter().map(|c| c.field.as_str()).collect();

        prop_assert_eq!(&merged[..remote.len()], &remote[..]);
        for change in &merged[remote.len()..] {
            prop_assert!(!remote_fields.contains(change.field.as_str()));
        }
        let kept_local = local.iter().filter(|c| !remote_fields.contains(c.field.as_str())).count();
        prop_assert_eq!(merged.len(), remote.len() + kept_local);
    }

    /// Property: merging with nothing local yields the remote changes unchanged
    #[test]
    fn merge_without_local_changes_is_remote(remote in changes_strategy()) {
        prop_assert_eq!(conflict::merge(&[], &remote), remote);
    }

    /// Property: applying an invalidation twice leaves the cache as applying it once
    #[test]
    fn invalidation_is_idempotent(
        change_type in change_type_strategy(),
        target in item_id_strategy(),
        others in prop::collection::vec(item_id_strategy(), 0..6),
    ) {
        let cache = ResponseCache::new();
        let ttl = Duration::from_secs(60);
        for id in others.iter().chain(std::iter::once(&target)) {
            cache.set(keys::item(id), json!({"id": id}), ttl);
            cache.set(keys::media_list(id), json!([]), ttl);
        }
        cache.set(keys::item_list(&json!({"page": 1})), json!([]), ttl);
        cache.set(keys::search(&json!("news")), json!([]), ttl);

        let keys_to_clear = invalidation::invalidation_keys(change_type, &target);
        invalidation::apply(&cache, &keys_to_clear);
        let after_once = cache.len();

        prop_assert_eq!(invalidation::apply(&cache, &keys_to_clear), 0);
        prop_assert_eq!(cache.len(), after_once);
        let page_one_list_key = keys::item_list(&json!({"page": 1}));
        prop_assert!(!cache.contains_key(&page_one_list_key) || change_type_keeps_lists(&keys_to_clear));
    }

    /// Property: awaited calls are never collapsed, whatever the key sequence
    #[test]
    fn sequential_dedup_calls_each_run(keys_seq in prop::collection::vec("[ab]", 1..10)) {
        let deduplicator = RequestDeduplicator::<usize>::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        tokio_test::block_on(async {
            for key in &keys_seq {
                let counter = Arc::clone(&calls);
                let result = deduplicator
                    .deduplicate(key.clone(), move || async move {
                        Ok(counter.fetch_add(1, Ordering::SeqCst))
                    })
                    .await;
                assert!(result.is_ok());
            }
        });

        prop_assert_eq!(calls.load(Ordering::SeqCst), keys_seq.len());
        prop_assert_eq!(deduplicator.pending_count(), 0);
    }
}

fn change_type_keeps_lists(keys_to_clear: &[String]) -> bool {
    !keys_to_clear.contains(&keys::item_list_pattern())
}
