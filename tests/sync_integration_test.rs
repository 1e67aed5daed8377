//! Stream notifications flowing through the sync manager into the shared cache

mod common;

use cms_resilience::cache::keys;
use cms_resilience::stream::{FieldChange, PresenceStatus, StaticCredentials};
use cms_resilience::sync::{ConflictStrategy, ConflictType};
use cms_resilience::{ResilienceConfig, ResilienceStack, SyncEvent};
use common::{fast_stream_config, settle, MockTransport, BASE_URL};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn started_stack(config: ResilienceConfig) -> (ResilienceStack, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::default());
    let stack = ResilienceStack::with_user(
        ResilienceConfig {
            stream: fast_stream_config(),
            ..config
        },
        BASE_URL,
        transport.clone(),
        Arc::new(StaticCredentials::new("secret")),
        "me",
    )
    .unwrap();
    stack.start().await.unwrap();
    (stack, transport)
}

fn seed_item(stack: &ResilienceStack, version: u64) {
    let ttl = Duration::from_secs(300);
    let cache = stack.cache();
    cache.set(keys::item("42"), json!({"id": "42", "version": version}), ttl);
    cache.set(keys::item_list(&json!({"page": 1})), json!([{"id": "42"}]), ttl);
    cache.set(keys::search(&json!({"q": "launch"})), json!([{"id": "42"}]), ttl);
    cache.set(keys::media_list("42"), json!([]), ttl);
}

#[tokio::test(start_paused = true)]
async fn test_remote_update_invalidates_cache_through_stream() {
    let (stack, transport) = started_stack(ResilienceConfig::default()).await;
    let mut events = stack.sync().events();
    seed_item(&stack, 3);

    let ids = stack.sync().subscribe_to_item("42");
    assert_eq!(ids.len(), 3);
    let mut server = transport.take_server(0);
    assert_eq!(server.drain().len(), 3);

    server.push_frame(json!({
        "type": "content_changed",
        "payload": {"itemId": "42", "changeType": "updated", "version": 3, "changes": []}
    }));
    settle().await;

    let cache = stack.cache();
    assert!(!cache.contains_key(&keys::item("42")));
    assert!(!cache.contains_key(&keys::item_list(&json!({"page": 1}))));
    assert!(!cache.contains_key(&keys::search(&json!({"q": "launch"}))));
    assert!(cache.contains_key(&keys::media_list("42")));

    let event = events.try_recv().unwrap();
    match event.payload {
        SyncEvent::CacheInvalidated(record) => {
            assert_eq!(record.source, "realtime");
            assert_eq!(record.removed, 3);
        }
        other => panic!("unexpected event {other:?}"),
    }
    stack.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_edit_is_merged() {
    let (stack, transport) = started_stack(ResilienceConfig::default()).await;
    seed_item(&stack, 3);
    stack
        .sync()
        .record_local_changes("42", vec![FieldChange::update("title", json!("A"))]);

    let server = transport.take_server(0);
    server.push_frame(json!({
        "type": "content_changed",
        "payload": {
            "itemId": "42",
            "changeType": "updated",
            "version": 3,
            "changes": [
                {"field": "title", "newValue": "B"},
                {"field": "tags", "newValue": ["x"]}
            ]
        }
    }));
    settle().await;

    let history = stack.sync().get_conflict_history("42");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].conflict_type, ConflictType::ConcurrentEdit);
    assert_eq!(history[0].strategy, ConflictStrategy::Merge);
    assert_eq!(
        history[0].resolved_changes,
        vec![
            FieldChange::update("title", json!("B")),
            FieldChange::update("tags", json!(["x"])),
        ]
    );
    stack.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_remote_wins_on_version_mismatch() {
    let mut config = ResilienceConfig::default();
    config.sync.conflict_resolution_strategy = ConflictStrategy::RemoteWins;
    let (stack, transport) = started_stack(config).await;
    seed_item(&stack, 2);
    stack
        .sync()
        .record_local_changes("42", vec![FieldChange::update("summary", json!("mine"))]);

    let server = transport.take_server(0);
    server.push_frame(json!({
        "type": "content_changed",
        "payload": {
            "itemId": "42",
            "changeType": "published",
            "version": 5,
            "changes": [{"field": "status", "newValue": "published"}]
        }
    }));
    settle().await;

    let history = stack.sync().get_conflict_history("42");
    assert_eq!(history[0].conflict_type, ConflictType::VersionMismatch);
    assert_eq!(history[0].cached_version, Some(2));
    assert_eq!(history[0].resolved_changes.len(), 1);
    assert_eq!(history[0].resolved_changes[0].field, "status");
    assert!(stack.sync().pending_local_changes("42").is_empty());
    stack.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_presence_and_collaboration_from_stream() {
    let (stack, transport) = started_stack(ResilienceConfig::default()).await;
    stack.sync().subscribe_to_item("42");
    let mut server = transport.take_server(0);

    server.push_frame(json!({
        "type": "presence_update",
        "payload": {"itemId": "42", "userId": "ana", "status": "editing"}
    }));
    server.push_frame(json!({
        "type": "collaboration_event",
        "payload": {"itemId": "42", "userId": "ana", "type": "section_lock", "data": {"section": "body"}}
    }));
    settle().await;

    let users = stack.sync().get_active_users("42");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].status, PresenceStatus::Editing);
    let session = stack.sync().get_collaboration_session("42").unwrap();
    assert_eq!(session.lock_holder("body"), Some("ana"));

    server.drain();
    stack.sync().update_presence("42", PresenceStatus::Viewing).unwrap();
    let sent = server.drain();
    assert_eq!(sent[0]["type"], "presence_update");
    assert_eq!(sent[0]["payload"]["userId"], "me");
    assert_eq!(stack.sync().get_active_users("42").len(), 2);
    stack.shutdown();
}
