//! # Real-time Stream
//!
//! Persistent connection to the CMS notification endpoint: authenticated
//! connect, heartbeat, exponential-backoff reconnection, subscription replay
//! and an outbound queue that survives disconnects.
//!
//! The transport is a seam ([`StreamTransport`]); production code uses
//! [`WebSocketTransport`], tests plug in channel-backed doubles.

pub mod client;
pub mod message;
pub mod transport;

pub use client::{reconnect_delay, ConnectionState, LatencyStats, StreamClient, StreamEvent};
pub use message::{
    ChangeOperation, ChangeType, CollaborationEvent, CollaborationEventType,
    ContentChangeNotification, CursorPosition, ErrorPayload, FieldChange, MessageType,
    PresenceStatus, PresenceUpdate, StreamMessage, Subscription, SubscriptionType, TextSelection,
};
pub use transport::{
    stream_url, CredentialProvider, StaticCredentials, StreamTransport, TransportChannels,
    TransportEvent, WebSocketTransport,
};
