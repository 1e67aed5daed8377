//! Reconnecting event-stream client.
//!
//! ```text
//! Disconnected → Connecting → Connected ──(unexpected close)──► Reconnecting
//!       ▲                                                          │
//!       └──── disconnect() / close 1000 / attempts exhausted ◄─────┘
//! ```
//!
//! Every successful open gets a new generation number; reader and heartbeat
//! tasks of an older generation ignore whatever they still observe.

use super::message::{
    CollaborationEvent, ContentChangeNotification, ErrorPayload, MessageType, PresenceUpdate,
    StreamMessage, Subscription, SubscriptionAck, SubscriptionType,
};
use super::transport::{
    stream_url, CredentialProvider, StreamTransport, TransportChannels, TransportEvent,
};
use crate::config::StreamConfig;
use crate::constants::stream::{LATENCY_SAMPLE_WINDOW, NORMAL_CLOSE_CODE};
use crate::error::{ResilienceError, Result};
use crate::events::{EventPublisher, PublishedEvent};
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

/// Typed events published by the client
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    ReconnectScheduled {
        attempt: u32,
        delay: Duration,
    },
    /// Attempts exhausted; real-time features stay down until `connect()`
    ReconnectFailed {
        attempts: u32,
    },
    ContentChanged(ContentChangeNotification),
    PresenceUpdate(PresenceUpdate),
    Collaboration(CollaborationEvent),
    SubscriptionConfirmed {
        id: String,
    },
    SubscriptionError {
        id: String,
        message: String,
    },
    ServerError {
        code: Option<String>,
        message: String,
    },
    ParseError {
        raw: String,
        error: String,
    },
    ConnectionError(String),
    Pong {
        latency: Duration,
    },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "stream.state_changed",
            Self::ReconnectScheduled { .. } => "stream.reconnect_scheduled",
            Self::ReconnectFailed { .. } => "stream.reconnect_failed",
            Self::ContentChanged(_) => "stream.content_changed",
            Self::PresenceUpdate(_) => "stream.presence_update",
            Self::Collaboration(_) => "stream.collaboration_event",
            Self::SubscriptionConfirmed { .. } => "stream.subscription_confirmed",
            Self::SubscriptionError { .. } => "stream.subscription_error",
            Self::ServerError { .. } => "stream.server_error",
            Self::ParseError { .. } => "stream.parse_error",
            Self::ConnectionError(_) => "stream.connection_error",
            Self::Pong { .. } => "stream.pong",
        }
    }
}

/// Delay before reconnect `attempt` (1-based): `min(base × 2^(attempt−1), cap)`
pub fn reconnect_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent).min(cap)
}

/// Heartbeat round-trip statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyStats {
    pub last: Option<Duration>,
    pub average: Option<Duration>,
    pub samples: usize,
}

#[derive(Debug, Default)]
struct LatencyTracker {
    samples: VecDeque<Duration>,
}

impl LatencyTracker {
    fn record(&mut self, sample: Duration) {
        if self.samples.len() == LATENCY_SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn stats(&self) -> LatencyStats {
        let average = (!self.samples.is_empty()).then(|| {
            self.samples.iter().sum::<Duration>() / self.samples.len() as u32
        });
        LatencyStats {
            last: self.samples.back().copied(),
            average,
            samples: self.samples.len(),
        }
    }
}

#[derive(Debug)]
struct ClientState {
    connection: ConnectionState,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    queue: VecDeque<String>,
    /// Creation order
    subscriptions: Vec<Subscription>,
    confirmed: HashSet<String>,
    reconnect_attempts: u32,
    manual_disconnect: bool,
    pending_ping: Option<Instant>,
    latency: LatencyTracker,
    reader: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl ClientState {
    fn abort_connection_tasks(&mut self) {
        for task in [self.reader.take(), self.heartbeat.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

struct ClientInner {
    config: StreamConfig,
    base_url: String,
    transport: Arc<dyn StreamTransport>,
    credentials: Arc<dyn CredentialProvider>,
    state: Mutex<ClientState>,
    events: EventPublisher<StreamEvent>,
}

/// Handle to the stream connection; clones share one connection
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("StreamClient")
            .field("base_url", &self.inner.base_url)
            .field("connection", &state.connection)
            .field("subscriptions", &state.subscriptions.len())
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl StreamClient {
    pub fn new(
        config: StreamConfig,
        base_url: impl Into<String>,
        transport: Arc<dyn StreamTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                base_url: base_url.into(),
                transport,
                credentials,
                state: Mutex::new(ClientState {
                    connection: ConnectionState::Disconnected,
                    generation: 0,
                    outbound: None,
                    queue: VecDeque::new(),
                    subscriptions: Vec::new(),
                    confirmed: HashSet::new(),
                    reconnect_attempts: 0,
                    manual_disconnect: false,
                    pending_ping: None,
                    latency: LatencyTracker::default(),
                    reader: None,
                    heartbeat: None,
                    reconnect: None,
                }),
                events: EventPublisher::default(),
            }),
        }
    }

    /// Open the connection. Cancels any scheduled reconnect and resets the attempt counter.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.connection == ConnectionState::Connected {
                return Ok(());
            }
            state.manual_disconnect = false;
            state.reconnect_attempts = 0;
            if let Some(task) = state.reconnect.take() {
                task.abort();
            }
        }

        let result = self.inner.establish().await;
        if let Err(e) = &result {
            warn!(error = %e, "Stream connect failed");
            self.inner.set_state(ConnectionState::Disconnected);
        }
        result
    }

    /// Close on purpose; no reconnection follows. Queued messages are kept.
    pub fn disconnect(&self) {
        let mut state = self.inner.state.lock();
        state.manual_disconnect = true;
        state.generation += 1;
        state.abort_connection_tasks();
        if let Some(task) = state.reconnect.take() {
            task.abort();
        }
        state.outbound = None;
        state.pending_ping = None;
        state.confirmed.clear();
        let previous = state.connection;
        state.connection = ConnectionState::Disconnected;
        drop(state);

        if previous != ConnectionState::Disconnected {
            info!(from = %previous, "Stream disconnected by client");
            self.inner.publish(StreamEvent::StateChanged {
                from: previous,
                to: ConnectionState::Disconnected,
            });
        }
    }

    /// Send now if connected, otherwise queue for the next successful connect
    pub fn send(&self, message: &StreamMessage) -> Result<()> {
        let text = message.to_json()?;
        self.inner.send_text(text);
        Ok(())
    }

    pub fn subscribe_to_content_changes(&self, item_id: impl Into<String>) -> String {
        self.subscribe(SubscriptionType::ContentChanges, item_id.into())
    }

    pub fn subscribe_to_presence(&self, item_id: impl Into<String>) -> String {
        self.subscribe(SubscriptionType::Presence, item_id.into())
    }

    pub fn subscribe_to_collaboration(&self, item_id: impl Into<String>) -> String {
        self.subscribe(SubscriptionType::Collaboration, item_id.into())
    }

    /// Record a subscription; it is announced now if connected and on every reconnect
    fn subscribe(&self, subscription_type: SubscriptionType, item_id: String) -> String {
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            subscription_type,
            item_id,
            created_at: Utc::now(),
        };
        let id = subscription.id.clone();

        let mut state = self.inner.state.lock();
        if state.connection == ConnectionState::Connected {
            if let Some(outbound) = &state.outbound {
                match StreamMessage::subscribe(&subscription).and_then(|m| m.to_json()) {
                    Ok(text) => {
                        let _ = outbound.send(text);
                    }
                    Err(e) => warn!(subscription_id = %id, error = %e, "Subscription not encodable"),
                }
            }
        }
        debug!(
            subscription_id = %id,
            kind = ?subscription.subscription_type,
            item_id = %subscription.item_id,
            "Subscription registered"
        );
        state.subscriptions.push(subscription);
        id
    }

    /// Drop a subscription locally and tell the server; returns whether it existed
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.id != subscription_id);
        if state.subscriptions.len() == before {
            return false;
        }
        state.confirmed.remove(subscription_id);

        if state.connection == ConnectionState::Connected {
            if let Some(outbound) = &state.outbound {
                if let Ok(text) = StreamMessage::unsubscribe(subscription_id).to_json() {
                    let _ = outbound.send(text);
                }
            }
        }
        debug!(subscription_id, "Subscription removed");
        true
    }

    /// Tear down every subscription held by this client
    pub fn unsubscribe_all(&self) -> usize {
        let ids: Vec<String> = self
            .inner
            .state
            .lock()
            .subscriptions
            .iter()
            .map(|s| s.id.clone())
            .collect();
        ids.iter().filter(|id| self.unsubscribe(id)).count()
    }

    /// Snapshot in creation order
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.state.lock().subscriptions.clone()
    }

    pub fn is_subscription_confirmed(&self, subscription_id: &str) -> bool {
        self.inner.state.lock().confirmed.contains(subscription_id)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn queued_messages(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().reconnect_attempts
    }

    pub fn latency(&self) -> LatencyStats {
        self.inner.state.lock().latency.stats()
    }

    pub fn events(&self) -> broadcast::Receiver<PublishedEvent<StreamEvent>> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }
}

impl ClientInner {
    fn publish(&self, event: StreamEvent) {
        self.events.publish(event.name(), event);
    }

    fn set_state(&self, to: ConnectionState) {
        let from = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.connection, to)
        };
        if from != to {
            debug!(%from, %to, "Stream state changed");
            self.publish(StreamEvent::StateChanged { from, to });
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Token, URL, open under the message timeout, then go live
    async fn establish(self: &Arc<Self>) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        let token = self.credentials.access_token().await.ok_or_else(|| {
            ResilienceError::Unauthenticated("no access token available for stream".to_string())
        })?;
        let url = stream_url(&self.base_url, &self.config.stream_path, &token)?;

        let message_timeout = self.config.message_timeout();
        let channels = timeout(message_timeout, self.transport.open(&url))
            .await
            .map_err(|_| ResilienceError::Timeout {
                operation: "stream connect".to_string(),
                timeout: message_timeout,
            })??;

        self.go_live(channels)
    }

    fn go_live(self: &Arc<Self>, channels: TransportChannels) -> Result<()> {
        let TransportChannels { outbound, inbound } = channels;

        let mut state = self.state.lock();
        if state.manual_disconnect {
            return Err(ResilienceError::Connection(
                "disconnected while connecting".to_string(),
            ));
        }

        state.generation += 1;
        let generation = state.generation;

        // Subscriptions first, in creation order, then the backlog
        let mut replayed = 0;
        for subscription in &state.subscriptions {
            match StreamMessage::subscribe(subscription).and_then(|m| m.to_json()) {
                Ok(text) => {
                    if outbound.send(text).is_ok() {
                        replayed += 1;
                    }
                }
                Err(e) => warn!(subscription_id = %subscription.id, error = %e, "Subscription not encodable"),
            }
        }
        let flushed = state.queue.len();
        while let Some(text) = state.queue.pop_front() {
            if let Err(mpsc::error::SendError(text)) = outbound.send(text) {
                state.queue.push_front(text);
                break;
            }
        }

        state.confirmed.clear();
        state.pending_ping = None;
        state.reconnect_attempts = 0;
        state.outbound = Some(outbound);
        state.abort_connection_tasks();
        state.reader = Some(tokio::spawn(read_loop(Arc::clone(self), generation, inbound)));
        state.heartbeat = Some(tokio::spawn(heartbeat_loop(Arc::clone(self), generation)));
        let from = std::mem::replace(&mut state.connection, ConnectionState::Connected);
        drop(state);

        info!(
            generation,
            subscriptions = replayed,
            flushed,
            "Stream connected"
        );
        self.publish(StreamEvent::StateChanged {
            from,
            to: ConnectionState::Connected,
        });
        Ok(())
    }

    fn send_text(&self, text: String) {
        let mut state = self.state.lock();
        let unsent = match (state.connection, state.outbound.as_ref()) {
            (ConnectionState::Connected, Some(outbound)) => match outbound.send(text) {
                Ok(()) => None,
                // Connection is going away; keep the message for the next one
                Err(mpsc::error::SendError(text)) => Some(text),
            },
            _ => Some(text),
        };
        if let Some(text) = unsent {
            enqueue(&mut state, text, self.config.max_queued_messages);
        }
    }

    /// Send on the live connection only; used for protocol replies
    fn send_direct(&self, message: StreamMessage) {
        let state = self.state.lock();
        if let (ConnectionState::Connected, Some(outbound)) = (state.connection, &state.outbound) {
            if let Ok(text) = message.to_json() {
                let _ = outbound.send(text);
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let message = match StreamMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Malformed stream frame");
                self.publish(StreamEvent::ParseError {
                    raw: text.to_string(),
                    error: e.to_string(),
                });
                return;
            }
        };
        trace!(kind = ?message.message_type, "Stream frame received");

        let event = match message.message_type {
            MessageType::Ping => {
                self.send_direct(StreamMessage::pong());
                return;
            }
            MessageType::Pong => {
                let latency = {
                    let mut state = self.state.lock();
                    let Some(sent_at) = state.pending_ping.take() else {
                        return;
                    };
                    let latency = sent_at.elapsed();
                    state.latency.record(latency);
                    latency
                };
                Ok(StreamEvent::Pong { latency })
            }
            MessageType::ContentChanged => message
                .decode_payload::<ContentChangeNotification>()
                .map(StreamEvent::ContentChanged),
            MessageType::PresenceUpdate => message
                .decode_payload::<PresenceUpdate>()
                .map(StreamEvent::PresenceUpdate),
            MessageType::CollaborationEvent => message
                .decode_payload::<CollaborationEvent>()
                .map(StreamEvent::Collaboration),
            MessageType::SubscriptionConfirmed => {
                message.decode_payload::<SubscriptionAck>().map(|ack| {
                    let mut state = self.state.lock();
                    if state.subscriptions.iter().any(|s| s.id == ack.id) {
                        state.confirmed.insert(ack.id.clone());
                    }
                    StreamEvent::SubscriptionConfirmed { id: ack.id }
                })
            }
            MessageType::SubscriptionError => {
                message.decode_payload::<SubscriptionAck>().map(|ack| {
                    let mut state = self.state.lock();
                    state.subscriptions.retain(|s| s.id != ack.id);
                    state.confirmed.remove(&ack.id);
                    let message = ack
                        .message
                        .unwrap_or_else(|| "subscription rejected".to_string());
                    warn!(subscription_id = %ack.id, %message, "Subscription rejected by server");
                    StreamEvent::SubscriptionError {
                        id: ack.id,
                        message,
                    }
                })
            }
            MessageType::Error => message.decode_payload::<ErrorPayload>().map(|payload| {
                error!(code = ?payload.code, message = %payload.message, "Server reported an error");
                StreamEvent::ServerError {
                    code: payload.code,
                    message: payload.message,
                }
            }),
            MessageType::Subscribe | MessageType::Unsubscribe => {
                debug!(kind = ?message.message_type, "Ignoring client-only frame from server");
                return;
            }
        };

        match event {
            Ok(event) => self.publish(event),
            Err(e) => {
                warn!(kind = ?message.message_type, error = %e, "Stream payload did not decode");
                self.publish(StreamEvent::ParseError {
                    raw: text.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// The connection of `generation` ended
    fn handle_close(self: &Arc<Self>, generation: u64, code: Option<u16>, reason: &str) {
        let mut state = self.state.lock();
        if state.generation != generation || state.connection != ConnectionState::Connected {
            return;
        }
        state.generation += 1;
        state.abort_connection_tasks();
        state.outbound = None;
        state.pending_ping = None;
        state.confirmed.clear();

        let clean = state.manual_disconnect || code == Some(NORMAL_CLOSE_CODE);
        let to = if clean {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Reconnecting
        };
        state.connection = to;
        drop(state);

        if clean {
            info!(?code, reason, "Stream closed normally");
        } else {
            warn!(?code, reason, "Stream closed unexpectedly");
        }
        self.publish(StreamEvent::StateChanged {
            from: ConnectionState::Connected,
            to,
        });

        if !clean {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.manual_disconnect {
            return;
        }

        state.reconnect_attempts += 1;
        let attempt = state.reconnect_attempts;
        let max_attempts = self.config.max_reconnect_attempts;
        if attempt > max_attempts {
            state.connection = ConnectionState::Disconnected;
            state.reconnect = None;
            drop(state);

            error!(attempts = max_attempts, "Stream reconnection abandoned");
            self.publish(StreamEvent::StateChanged {
                from: ConnectionState::Reconnecting,
                to: ConnectionState::Disconnected,
            });
            self.publish(StreamEvent::ReconnectFailed {
                attempts: max_attempts,
            });
            return;
        }

        let delay = reconnect_delay(
            self.config.reconnect_interval(),
            attempt,
            self.config.max_reconnect_delay(),
        );
        info!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        let inner = Arc::clone(self);
        let task: BoxFuture<'static, ()> = Box::pin(async move {
            sleep(delay).await;
            {
                let state = inner.state.lock();
                if state.manual_disconnect || state.connection != ConnectionState::Reconnecting {
                    return;
                }
            }
            if let Err(e) = inner.establish().await {
                warn!(attempt, error = %e, "Reconnect attempt failed");
                inner.set_state(ConnectionState::Reconnecting);
                inner.schedule_reconnect();
            }
        });
        state.reconnect = Some(tokio::spawn(task));
        drop(state);

        self.publish(StreamEvent::ReconnectScheduled { attempt, delay });
    }
}

fn enqueue(state: &mut ClientState, text: String, max_queued: usize) {
    if state.queue.len() >= max_queued {
        state.queue.pop_front();
        warn!(max_queued, "Outbound queue full, dropping oldest message");
    }
    state.queue.push_back(text);
}

async fn read_loop(
    inner: Arc<ClientInner>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = inbound.recv().await {
        if !inner.is_current(generation) {
            return;
        }
        match event {
            TransportEvent::Text(text) => inner.handle_frame(&text),
            TransportEvent::Error(e) => {
                warn!(generation, error = %e, "Stream transport error");
                inner.publish(StreamEvent::ConnectionError(e));
            }
            TransportEvent::Closed { code, reason } => {
                inner.handle_close(generation, code, &reason);
                return;
            }
        }
    }
    inner.handle_close(generation, None, "transport ended");
}

async fn heartbeat_loop(inner: Arc<ClientInner>, generation: u64) {
    let mut ticker = interval(inner.config.heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let overdue = {
            let mut state = inner.state.lock();
            if state.generation != generation {
                return;
            }
            let timeout = inner.config.heartbeat_timeout();
            let overdue = match (state.pending_ping, timeout) {
                (Some(sent_at), Some(limit)) => sent_at.elapsed() >= limit,
                _ => false,
            };
            if !overdue {
                // Without a timeout a lost ping is forgotten; the next pong answers the latest one
                if state.pending_ping.is_none() || timeout.is_none() {
                    state.pending_ping = Some(Instant::now());
                }
                if let (Some(outbound), Ok(text)) = (&state.outbound, StreamMessage::ping().to_json()) {
                    let _ = outbound.send(text);
                }
            }
            overdue
        };

        if overdue {
            warn!(generation, "Heartbeat unanswered, forcing reconnect");
            inner.handle_close(generation, None, "heartbeat timeout");
            return;
        }
    }
}
