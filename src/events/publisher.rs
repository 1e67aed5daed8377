use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Broadcast publisher for typed lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher<T: Clone> {
    sender: broadcast::Sender<PublishedEvent<T>>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent<T> {
    pub name: &'static str,
    pub payload: T,
    pub published_at: DateTime<Utc>,
}

impl<T: Clone> EventPublisher<T> {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, name: &'static str, payload: T) {
        let event = PublishedEvent {
            name,
            payload,
            published_at: Utc::now(),
        };

        if self.sender.send(event).is_err() {
            tracing::trace!(event = name, "No subscribers for published event");
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent<T>> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for EventPublisher<T> {
    fn default() -> Self {
        Self::new(crate::constants::stream::EVENT_CHANNEL_CAPACITY)
    }
}
