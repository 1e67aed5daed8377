//! Stream wire format.
//!
//! Every frame is a JSON object `{ "type", "payload", "timestamp" }`. Payload
//! field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recognized frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Subscribe,
    Unsubscribe,
    Ping,
    Pong,
    PresenceUpdate,
    CollaborationEvent,
    ContentChanged,
    SubscriptionConfirmed,
    SubscriptionError,
    Error,
}

/// Envelope of every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl StreamMessage {
    pub fn new(message_type: MessageType, payload: Value) -> Self {
        Self {
            message_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Build a frame from any serializable payload
    pub fn with_payload<P: Serialize>(message_type: MessageType, payload: &P) -> crate::Result<Self> {
        Ok(Self::new(message_type, serde_json::to_value(payload)?))
    }

    pub fn ping() -> Self {
        Self::new(MessageType::Ping, Value::Object(Default::default()))
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, Value::Object(Default::default()))
    }

    pub fn subscribe(subscription: &Subscription) -> crate::Result<Self> {
        Self::with_payload(MessageType::Subscribe, subscription)
    }

    pub fn unsubscribe(subscription_id: &str) -> Self {
        Self::new(
            MessageType::Unsubscribe,
            serde_json::json!({ "id": subscription_id }),
        )
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode the payload into a typed structure
    pub fn decode_payload<P: serde::de::DeserializeOwned>(&self) -> crate::Result<P> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    ContentChanges,
    Presence,
    Collaboration,
}

/// A live interest in an item; replayed after every reconnect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "type")]
    pub subscription_type: SubscriptionType,
    pub item_id: String,
    pub created_at: DateTime<Utc>,
}

/// Payload of `subscription_confirmed` and `subscription_error`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionAck {
    #[serde(alias = "subscriptionId")]
    pub id: String,
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}

/// Kind of remote change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    Archived,
    Published,
    Restored,
    MediaAdded,
    MediaRemoved,
    StatusChanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Archived => "archived",
            Self::Published => "published",
            Self::Restored => "restored",
            Self::MediaAdded => "media_added",
            Self::MediaRemoved => "media_removed",
            Self::StatusChanged => "status_changed",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    #[default]
    Update,
    Insert,
    Delete,
}

/// One field-level edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    #[serde(default)]
    pub operation: ChangeOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl FieldChange {
    /// Whole-value replacement of a field
    pub fn update(field: impl Into<String>, new_value: Value) -> Self {
        Self {
            field: field.into(),
            operation: ChangeOperation::Update,
            new_value: Some(new_value),
            position: None,
            length: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChangeNotification {
    pub item_id: String,
    pub change_type: ChangeType,
    #[serde(default)]
    pub changes: Vec<FieldChange>,
    pub version: u64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Viewing,
    Editing,
    Idle,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub item_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub status: PresenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<TextSelection>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationEventType {
    Join,
    Leave,
    CursorMove,
    TextSelect,
    SectionLock,
    SectionUnlock,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationEvent {
    pub item_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub event_type: CollaborationEventType,
    /// Event-specific data: `cursor`, `selection`, `section`, `changes`
    #[serde(default)]
    pub data: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Payload of an `error` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}
