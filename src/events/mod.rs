//! Typed event fan-out used by the stream client and the sync manager.

pub mod publisher;

pub use publisher::{EventPublisher, PublishedEvent};
