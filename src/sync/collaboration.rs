//! Collaborative editing sessions.

use crate::stream::{CollaborationEvent, CollaborationEventType, CursorPosition, TextSelection};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    pub cursor: Option<CursorPosition>,
    pub selection: Option<TextSelection>,
}

/// Result of applying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    Applied,
    /// Lock held by someone else, or unlock by a non-holder
    Rejected(String),
    /// Last participant left
    Closed,
}

/// Roster, section locks and event log of one item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationSession {
    pub item_id: String,
    pub participants: HashMap<String, Participant>,
    /// section → holder
    pub locks: HashMap<String, String>,
    pub events: VecDeque<CollaborationEvent>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    max_events: usize,
}

impl CollaborationSession {
    pub fn new(item_id: impl Into<String>, max_events: usize) -> Self {
        Self {
            item_id: item_id.into(),
            participants: HashMap::new(),
            locks: HashMap::new(),
            events: VecDeque::new(),
            created_at: Utc::now(),
            max_events,
        }
    }

    pub fn apply(&mut self, event: CollaborationEvent) -> SessionChange {
        let user_id = event.user_id.clone();

        match event.event_type {
            CollaborationEventType::Leave => {
                self.participants.remove(&user_id);
                self.locks.retain(|_, holder| *holder != user_id);
            }
            CollaborationEventType::SectionLock => {
                let Some(section) = section_of(&event.data) else {
                    return SessionChange::Rejected("lock without section".to_string());
                };
                match self.locks.get(&section) {
                    Some(holder) if *holder != user_id => {
                        debug!(item_id = %self.item_id, %section, holder = %holder, requester = %user_id, "Section lock denied");
                        return SessionChange::Rejected(format!("section '{section}' is locked by {holder}"));
                    }
                    _ => {
                        self.join(&user_id);
                        self.locks.insert(section, user_id.clone());
                    }
                }
            }
            CollaborationEventType::SectionUnlock => {
                let Some(section) = section_of(&event.data) else {
                    return SessionChange::Rejected("unlock without section".to_string());
                };
                if self.locks.get(&section) != Some(&user_id) {
                    return SessionChange::Rejected(format!(
                        "section '{section}' is not locked by {user_id}"
                    ));
                }
                self.locks.remove(&section);
            }
            CollaborationEventType::Join | CollaborationEventType::Edit => {
                self.join(&user_id);
            }
            CollaborationEventType::CursorMove => {
                let cursor = decode_field::<CursorPosition>(&event.data, "cursor");
                self.join(&user_id).cursor = cursor;
            }
            CollaborationEventType::TextSelect => {
                let selection = decode_field::<TextSelection>(&event.data, "selection");
                self.join(&user_id).selection = selection;
            }
        }

        self.record(event);
        if self.participants.is_empty() {
            SessionChange::Closed
        } else {
            SessionChange::Applied
        }
    }

    fn join(&mut self, user_id: &str) -> &mut Participant {
        self.participants
            .entry(user_id.to_string())
            .or_insert_with(|| Participant {
                user_id: user_id.to_string(),
                joined_at: Utc::now(),
                cursor: None,
                selection: None,
            })
    }

    fn record(&mut self, event: CollaborationEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn lock_holder(&self, section: &str) -> Option<&str> {
        self.locks.get(section).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

fn section_of(data: &Value) -> Option<String> {
    data.get("section")
        .or_else(|| data.get("sectionId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `data[key]`, or `data` itself when the payload is not wrapped
fn decode_field<T: serde::de::DeserializeOwned>(data: &Value, key: &str) -> Option<T> {
    data.get(key)
        .and_then(|inner| serde_json::from_value(inner.clone()).ok())
        .or_else(|| serde_json::from_value(data.clone()).ok())
}
