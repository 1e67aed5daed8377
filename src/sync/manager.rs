//! Synchronization manager: stream events in, cache/presence/session state out.

use super::collaboration::{CollaborationSession, SessionChange};
use super::conflict::{self, ConflictResolution};
use super::invalidation::{self, InvalidationEvent};
use super::presence::PresenceTracker;
use super::SyncEvent;
use crate::cache::{keys, ResponseCache};
use crate::config::SyncConfig;
use crate::constants::events as event_names;
use crate::constants::sync::REALTIME_SOURCE;
use crate::error::Result;
use crate::events::{EventPublisher, PublishedEvent};
use crate::stream::{
    CollaborationEvent, CollaborationEventType, ConnectionState, ContentChangeNotification,
    CursorPosition, FieldChange, MessageType, PresenceStatus, PresenceUpdate, StreamClient,
    StreamEvent, StreamMessage, TextSelection,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct SyncState {
    /// Unflushed local edits per item
    local_changes: HashMap<String, Vec<FieldChange>>,
    conflict_history: HashMap<String, VecDeque<ConflictResolution>>,
    presence: HashMap<String, PresenceTracker>,
    sessions: HashMap<String, CollaborationSession>,
    /// Stream subscription ids per item
    item_subscriptions: HashMap<String, Vec<String>>,
}

struct SyncInner {
    config: SyncConfig,
    user_id: String,
    client: StreamClient,
    cache: Arc<ResponseCache>,
    events: EventPublisher<SyncEvent>,
    state: Mutex<SyncState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<SyncInner>,
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SyncManager")
            .field("user_id", &self.inner.user_id)
            .field("items", &state.item_subscriptions.len())
            .field("sessions", &state.sessions.len())
            .finish()
    }
}

impl SyncManager {
    pub fn new(
        config: SyncConfig,
        client: StreamClient,
        cache: Arc<ResponseCache>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                config,
                user_id: user_id.into(),
                client,
                cache,
                events: EventPublisher::default(),
                state: Mutex::new(SyncState::default()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn the stream consumer and the presence cleanup ticker
    pub fn start(&self) {
        let mut tasks = self.inner.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let receiver = self.inner.client.events();
        tasks.push(tokio::spawn(consume_stream(
            Arc::downgrade(&self.inner),
            receiver,
        )));
        tasks.push(tokio::spawn(presence_cleanup(Arc::downgrade(&self.inner))));
        info!(user_id = %self.inner.user_id, "Sync manager started");
    }

    /// Abort background tasks started by [`start`](Self::start)
    pub fn stop(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }

    pub async fn connect(&self) -> Result<()> {
        self.inner.client.connect().await
    }

    pub fn disconnect(&self) {
        self.inner.client.disconnect();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.client.connection_state()
    }

    /// Follow an item's content changes, presence and collaboration
    pub fn subscribe_to_item(&self, item_id: &str) -> Vec<String> {
        let client = &self.inner.client;
        let ids = vec![
            client.subscribe_to_content_changes(item_id),
            client.subscribe_to_presence(item_id),
            client.subscribe_to_collaboration(item_id),
        ];
        self.inner
            .state
            .lock()
            .item_subscriptions
            .entry(item_id.to_string())
            .or_default()
            .extend(ids.iter().cloned());
        debug!(item_id, "Subscribed to item");
        ids
    }

    /// Drop the item's subscriptions and presence roster; returns whether it was followed
    pub fn unsubscribe_from_item(&self, item_id: &str) -> bool {
        let ids = {
            let mut state = self.inner.state.lock();
            state.presence.remove(item_id);
            state.item_subscriptions.remove(item_id)
        };
        let Some(ids) = ids else {
            return false;
        };
        for id in &ids {
            self.inner.client.unsubscribe(id);
        }
        debug!(item_id, "Unsubscribed from item");
        true
    }

    /// Announce this user's presence on an item
    pub fn update_presence(&self, item_id: &str, status: PresenceStatus) -> Result<()> {
        let update = PresenceUpdate {
            item_id: item_id.to_string(),
            user_id: self.inner.user_id.clone(),
            user_name: None,
            status,
            cursor: None,
            selection: None,
            timestamp: Utc::now(),
        };
        self.inner.client.send(&StreamMessage::with_payload(
            MessageType::PresenceUpdate,
            &update,
        )?)?;
        self.inner.apply_presence(update);
        Ok(())
    }

    pub fn send_cursor_position(&self, item_id: &str, cursor: CursorPosition) -> Result<()> {
        self.send_collaboration(
            item_id,
            CollaborationEventType::CursorMove,
            json!({ "cursor": cursor }),
        )
    }

    pub fn send_text_selection(&self, item_id: &str, selection: TextSelection) -> Result<()> {
        self.send_collaboration(
            item_id,
            CollaborationEventType::TextSelect,
            json!({ "selection": selection }),
        )
    }

    fn send_collaboration(
        &self,
        item_id: &str,
        event_type: CollaborationEventType,
        data: serde_json::Value,
    ) -> Result<()> {
        let event = CollaborationEvent {
            item_id: item_id.to_string(),
            user_id: self.inner.user_id.clone(),
            event_type,
            data,
            timestamp: Utc::now(),
        };
        self.inner.client.send(&StreamMessage::with_payload(
            MessageType::CollaborationEvent,
            &event,
        )?)
    }

    pub fn get_active_users(&self, item_id: &str) -> Vec<PresenceUpdate> {
        self.inner
            .state
            .lock()
            .presence
            .get(item_id)
            .map(PresenceTracker::active_users)
            .unwrap_or_default()
    }

    pub fn get_collaboration_session(&self, item_id: &str) -> Option<CollaborationSession> {
        self.inner.state.lock().sessions.get(item_id).cloned()
    }

    /// Oldest first
    pub fn get_conflict_history(&self, item_id: &str) -> Vec<ConflictResolution> {
        self.inner
            .state
            .lock()
            .conflict_history
            .get(item_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Register local edits not yet acknowledged by the server
    pub fn record_local_changes(&self, item_id: &str, changes: Vec<FieldChange>) {
        self.inner
            .state
            .lock()
            .local_changes
            .entry(item_id.to_string())
            .or_default()
            .extend(changes);
    }

    /// Forget local edits once they have been persisted remotely
    pub fn clear_local_changes(&self, item_id: &str) {
        self.inner.state.lock().local_changes.remove(item_id);
    }

    pub fn pending_local_changes(&self, item_id: &str) -> Vec<FieldChange> {
        self.inner
            .state
            .lock()
            .local_changes
            .get(item_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Evict stale presence now; returns the number of users removed
    pub fn cleanup_presence(&self) -> usize {
        self.inner.cleanup_presence()
    }

    /// Apply one stream event directly
    pub fn handle_stream_event(&self, event: StreamEvent) {
        self.inner.handle_stream_event(event);
    }

    pub fn events(&self) -> broadcast::Receiver<PublishedEvent<SyncEvent>> {
        self.inner.events.subscribe()
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn client(&self) -> &StreamClient {
        &self.inner.client
    }
}

impl SyncInner {
    fn handle_stream_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::ContentChanged(notification) => self.handle_content_change(notification),
            StreamEvent::PresenceUpdate(update) => self.apply_presence(update),
            StreamEvent::Collaboration(event) => self.apply_collaboration(event),
            StreamEvent::ReconnectFailed { attempts } => {
                warn!(attempts, "Real-time updates unavailable until reconnect");
            }
            other => debug!(event = other.name(), "Stream event not handled by sync"),
        }
    }

    fn handle_content_change(&self, notification: ContentChangeNotification) {
        // Conflicts are judged against the cache before it is invalidated
        self.check_conflict(&notification);

        let keys = invalidation::invalidation_keys(notification.change_type, &notification.item_id);
        let delay = self.config.invalidation_delay();
        if delay.is_zero() {
            let event = apply_invalidation(&self.cache, &notification, keys);
            self.events.publish(event_names::CACHE_INVALIDATED, SyncEvent::CacheInvalidated(event));
        } else {
            let cache = Arc::clone(&self.cache);
            let events = self.events.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                let event = apply_invalidation(&cache, &notification, keys);
                events.publish(event_names::CACHE_INVALIDATED, SyncEvent::CacheInvalidated(event));
            });
        }
    }

    fn check_conflict(&self, notification: &ContentChangeNotification) {
        let cached_version = self
            .cache
            .peek(&keys::item(&notification.item_id))
            .and_then(|entry| entry.version());

        let resolution = {
            let mut state = self.state.lock();
            let local = state
                .local_changes
                .get(&notification.item_id)
                .cloned()
                .unwrap_or_default();
            let Some(conflict_type) = conflict::detect(cached_version, notification, &local) else {
                return;
            };

            let strategy = self.config.conflict_resolution_strategy;
            let resolution = conflict::build_resolution(
                conflict_type,
                strategy,
                cached_version,
                notification,
                local,
            );
            if resolution.resolved {
                // Local edits are folded into the resolution
                state.local_changes.remove(&notification.item_id);
            }

            let history = state
                .conflict_history
                .entry(notification.item_id.clone())
                .or_default();
            if history.len() >= self.config.max_conflict_history {
                history.pop_front();
            }
            history.push_back(resolution.clone());
            resolution
        };

        if resolution.resolved {
            info!(
                item_id = %resolution.item_id,
                conflict = ?resolution.conflict_type,
                strategy = ?resolution.strategy,
                resolved_changes = resolution.resolved_changes.len(),
                "Conflict resolved"
            );
            self.events.publish(
                event_names::CONFLICT_RESOLVED,
                SyncEvent::ConflictResolved(resolution),
            );
        } else {
            warn!(
                item_id = %resolution.item_id,
                conflict = ?resolution.conflict_type,
                "Conflict requires manual resolution"
            );
            self.events.publish(
                event_names::CONFLICT_DETECTED,
                SyncEvent::ConflictDetected(resolution),
            );
        }
    }

    fn apply_presence(&self, update: PresenceUpdate) {
        let item_id = update.item_id.clone();
        let users = {
            let mut state = self.state.lock();
            let tracker = state
                .presence
                .entry(item_id.clone())
                .or_insert_with(|| PresenceTracker::new(&item_id, self.config.max_participants));
            if !tracker.update(update) {
                return;
            }
            tracker.active_users()
        };
        self.events.publish(
            event_names::PRESENCE_CHANGED,
            SyncEvent::PresenceChanged { item_id, users },
        );
    }

    fn apply_collaboration(&self, event: CollaborationEvent) {
        let item_id = event.item_id.clone();
        let (outcome, had_participants) = {
            let mut state = self.state.lock();
            let session = state
                .sessions
                .entry(item_id.clone())
                .or_insert_with(|| CollaborationSession::new(&item_id, self.config.max_session_events));
            let had_participants = !session.is_empty();
            let change = session.apply(event.clone());
            // Never keep a session without participants, even after a rejected event
            if session.is_empty() {
                state.sessions.remove(&item_id);
            }
            (change, had_participants)
        };

        match outcome {
            SessionChange::Applied => self.events.publish(
                event_names::SESSION_UPDATED,
                SyncEvent::SessionUpdated { item_id, event },
            ),
            SessionChange::Closed if !had_participants => {
                debug!(item_id = %item_id, user_id = %event.user_id, "Ignoring event for unknown session");
            }
            SessionChange::Closed => {
                info!(item_id = %item_id, "Collaboration session closed");
                self.events
                    .publish(event_names::SESSION_CLOSED, SyncEvent::SessionClosed { item_id });
            }
            SessionChange::Rejected(reason) => {
                debug!(item_id = %item_id, user_id = %event.user_id, %reason, "Collaboration event rejected");
            }
        }
    }

    fn cleanup_presence(&self) -> usize {
        let stale_after = self.config.presence_stale_after();
        let changed: Vec<(String, Vec<PresenceUpdate>, usize)> = {
            let mut state = self.state.lock();
            let changed = state
                .presence
                .iter_mut()
                .filter_map(|(item_id, tracker)| {
                    let evicted = tracker.evict_stale(stale_after).len();
                    (evicted > 0).then(|| (item_id.clone(), tracker.active_users(), evicted))
                })
                .collect();
            state.presence.retain(|_, tracker| !tracker.is_empty());
            changed
        };

        let mut total = 0;
        for (item_id, users, evicted) in changed {
            total += evicted;
            self.events.publish(
                event_names::PRESENCE_CHANGED,
                SyncEvent::PresenceChanged { item_id, users },
            );
        }
        total
    }
}

fn apply_invalidation(
    cache: &ResponseCache,
    notification: &ContentChangeNotification,
    keys: Vec<String>,
) -> InvalidationEvent {
    let removed = invalidation::apply(cache, &keys);
    info!(
        item_id = %notification.item_id,
        change_type = %notification.change_type,
        removed,
        "Cache invalidated from stream notification"
    );
    InvalidationEvent {
        change_type: notification.change_type,
        keys,
        item_id: notification.item_id.clone(),
        timestamp: Utc::now(),
        source: REALTIME_SOURCE.to_string(),
        removed,
    }
}

async fn consume_stream(
    inner: Weak<SyncInner>,
    mut receiver: broadcast::Receiver<PublishedEvent<StreamEvent>>,
) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                inner.handle_stream_event(event.payload);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Sync consumer lagged behind the stream");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn presence_cleanup(inner: Weak<SyncInner>) {
    let period = match inner.upgrade() {
        Some(inner) => inner.config.presence_cleanup_interval(),
        None => return,
    };
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.cleanup_presence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::stream::{ChangeType, StaticCredentials, StreamTransport, TransportChannels};
    use crate::sync::ConflictStrategy;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;
    use url::Url;

    struct OfflineTransport;

    #[async_trait]
    impl StreamTransport for OfflineTransport {
        async fn open(&self, _url: &Url) -> Result<TransportChannels> {
            Err(crate::ResilienceError::Connection("offline".to_string()))
        }
    }

    fn manager(config: SyncConfig) -> (SyncManager, Arc<ResponseCache>) {
        let cache = Arc::new(ResponseCache::new());
        let client = StreamClient::new(
            StreamConfig::default(),
            "https://cms.example.com",
            Arc::new(OfflineTransport),
            Arc::new(StaticCredentials::new("t")),
        );
        (
            SyncManager::new(config, client, Arc::clone(&cache), "me"),
            cache,
        )
    }

    fn change(item_id: &str, change_type: ChangeType, version: u64, changes: Vec<FieldChange>) -> StreamEvent {
        StreamEvent::ContentChanged(ContentChangeNotification {
            item_id: item_id.to_string(),
            change_type,
            changes,
            version,
            timestamp: Utc::now(),
        })
    }

    fn seed(cache: &ResponseCache, version: u64) {
        let ttl = Duration::from_secs(60);
        cache.set(keys::item("42"), json!({"id": "42", "version": version}), ttl);
        cache.set(keys::item_list(&json!({"page": 1})), json!([]), ttl);
        cache.set(keys::search(&json!("q")), json!([]), ttl);
        cache.set(keys::media_list("42"), json!([]), ttl);
        cache.set(keys::item("7"), json!({"id": "7"}), ttl);
    }

    #[tokio::test]
    async fn test_update_invalidates_item_lists_and_search() {
        let (sync, cache) = manager(SyncConfig::default());
        let mut events = sync.events();
        seed(&cache, 3);

        sync.handle_stream_event(change("42", ChangeType::Updated, 3, vec![]));

        assert!(!cache.contains_key(&keys::item("42")));
        assert!(cache.contains_key(&keys::media_list("42")));
        assert!(cache.contains_key(&keys::item("7")));
        assert_eq!(cache.len(), 2);

        let event = events.try_recv().unwrap();
        match event.payload {
            SyncEvent::CacheInvalidated(record) => {
                assert_eq!(record.removed, 3);
                assert_eq!(record.source, "realtime");
                assert_eq!(record.item_id, "42");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(sync.get_conflict_history("42").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_waits_for_configured_delay() {
        let (sync, cache) = manager(SyncConfig {
            invalidation_delay_ms: 500,
            ..SyncConfig::default()
        });
        seed(&cache, 1);

        sync.handle_stream_event(change("42", ChangeType::Deleted, 1, vec![]));
        tokio::task::yield_now().await;
        assert!(cache.contains_key(&keys::item("42")));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!cache.contains_key(&keys::item("42")));
        assert!(!cache.contains_key(&keys::media_list("42")));
    }

    #[tokio::test]
    async fn test_merge_conflict_scenario() {
        let (sync, cache) = manager(SyncConfig::default());
        seed(&cache, 3);
        sync.record_local_changes("42", vec![FieldChange::update("title", json!("A"))]);

        sync.handle_stream_event(change(
            "42",
            ChangeType::Updated,
            3,
            vec![
                FieldChange::update("title", json!("B")),
                FieldChange::update("tags", json!(["x"])),
            ],
        ));

        let history = sync.get_conflict_history("42");
        assert_eq!(history.len(), 1);
        let resolution = &history[0];
        assert_eq!(resolution.conflict_type, conflict::ConflictType::ConcurrentEdit);
        assert_eq!(
            resolution.resolved_changes,
            vec![
                FieldChange::update("title", json!("B")),
                FieldChange::update("tags", json!(["x"])),
            ]
        );
        assert!(sync.pending_local_changes("42").is_empty());
    }

    #[tokio::test]
    async fn test_version_mismatch_under_manual_keeps_local_changes() {
        let (sync, cache) = manager(SyncConfig {
            conflict_resolution_strategy: ConflictStrategy::Manual,
            ..SyncConfig::default()
        });
        let mut events = sync.events();
        seed(&cache, 2);
        sync.record_local_changes("42", vec![FieldChange::update("title", json!("A"))]);

        sync.handle_stream_event(change("42", ChangeType::Updated, 5, vec![]));

        let first = events.try_recv().unwrap();
        assert_eq!(first.name, event_names::CONFLICT_DETECTED);
        match first.payload {
            SyncEvent::ConflictDetected(resolution) => {
                assert_eq!(resolution.conflict_type, conflict::ConflictType::VersionMismatch);
                assert_eq!(resolution.cached_version, Some(2));
                assert!(!resolution.resolved);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(sync.pending_local_changes("42").len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_history_is_capped() {
        let (sync, _cache) = manager(SyncConfig {
            max_conflict_history: 2,
            ..SyncConfig::default()
        });
        for version in 1..=4 {
            sync.record_local_changes("42", vec![FieldChange::update("title", json!(version))]);
            sync.handle_stream_event(change("42", ChangeType::Updated, version, vec![]));
        }
        let history = sync.get_conflict_history("42");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].remote_version, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_roster_and_cleanup() {
        let (sync, _cache) = manager(SyncConfig::default());
        let presence = |user: &str, status| {
            StreamEvent::PresenceUpdate(PresenceUpdate {
                item_id: "42".to_string(),
                user_id: user.to_string(),
                user_name: None,
                status,
                cursor: None,
                selection: None,
                timestamp: Utc::now(),
            })
        };

        sync.handle_stream_event(presence("ana", PresenceStatus::Editing));
        sync.handle_stream_event(presence("ben", PresenceStatus::Viewing));
        sync.handle_stream_event(presence("ben", PresenceStatus::Offline));
        assert_eq!(sync.get_active_users("42").len(), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(sync.cleanup_presence(), 1);
        assert!(sync.get_active_users("42").is_empty());
    }

    #[tokio::test]
    async fn test_collaboration_session_lifecycle() {
        let (sync, _cache) = manager(SyncConfig::default());
        let collab = |user: &str, event_type, data| {
            StreamEvent::Collaboration(CollaborationEvent {
                item_id: "42".to_string(),
                user_id: user.to_string(),
                event_type,
                data,
                timestamp: Utc::now(),
            })
        };

        sync.handle_stream_event(collab("ana", CollaborationEventType::Join, json!({})));
        sync.handle_stream_event(collab(
            "ana",
            CollaborationEventType::SectionLock,
            json!({"section": "body"}),
        ));
        let session = sync.get_collaboration_session("42").unwrap();
        assert_eq!(session.lock_holder("body"), Some("ana"));

        sync.handle_stream_event(collab("ana", CollaborationEventType::Leave, json!({})));
        assert!(sync.get_collaboration_session("42").is_none());
    }

    #[tokio::test]
    async fn test_rejected_or_stray_events_leave_no_session() {
        let (sync, _cache) = manager(SyncConfig::default());
        let mut events = sync.events();
        let collab = |event_type, data| {
            StreamEvent::Collaboration(CollaborationEvent {
                item_id: "42".to_string(),
                user_id: "ana".to_string(),
                event_type,
                data,
                timestamp: Utc::now(),
            })
        };

        sync.handle_stream_event(collab(
            CollaborationEventType::SectionUnlock,
            json!({"section": "body"}),
        ));
        assert!(sync.get_collaboration_session("42").is_none());

        sync.handle_stream_event(collab(CollaborationEventType::SectionLock, json!({})));
        assert!(sync.get_collaboration_session("42").is_none());

        // Leaving a session that never existed announces nothing
        sync.handle_stream_event(collab(CollaborationEventType::Leave, json!({})));
        assert!(sync.get_collaboration_session("42").is_none());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_created_clears_unfiltered_list_and_search() {
        let (sync, cache) = manager(SyncConfig::default());
        let ttl = Duration::from_secs(60);
        cache.set(keys::item_list(&Value::Null), json!([]), ttl);
        cache.set(keys::search(&Value::Null), json!([]), ttl);
        cache.set(keys::item("7"), json!({"id": "7"}), ttl);

        sync.handle_stream_event(change("8", ChangeType::Created, 1, vec![]));

        assert!(!cache.contains_key(&keys::item_list(&Value::Null)));
        assert!(!cache.contains_key(&keys::search(&Value::Null)));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_outbound_presence_is_queued_while_offline() {
        let (sync, _cache) = manager(SyncConfig::default());
        let ids = sync.subscribe_to_item("42");
        assert_eq!(ids.len(), 3);

        sync.update_presence("42", PresenceStatus::Editing).unwrap();
        sync.send_cursor_position("42", CursorPosition { field: None, offset: 4 }).unwrap();
        assert_eq!(sync.client().queued_messages(), 2);
        assert_eq!(sync.get_active_users("42")[0].user_id, "me");

        assert!(sync.unsubscribe_from_item("42"));
        assert!(sync.client().subscriptions().is_empty());
        assert!(!sync.unsubscribe_from_item("42"));
    }
}
