//! Realtime dispatch events fanned out over the WebSocket gateway
//!
//! Publishing is fire-and-forget after a transition commits; the event type
//! carries its audience so the gateway can route without extra lookups.

use serde::{Deserialize, Serialize};

/// Who should receive an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum Audience {
    /// Companies subscribed to a geography key
    Region { country: String, state: String },
    /// One rider, by identity
    Rider { rider_id: String },
    /// The single global admin channel
    Admin,
}

/// Event names as published to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchEventKind {
    /// An entry entered (or re-entered) the pool for a region
    #[serde(rename = "newEntry")]
    NewEntry,
    /// An entry was offered to a specific rider
    #[serde(rename = "assignEntry")]
    AssignEntry,
    /// A company or rider accepted an entry
    #[serde(rename = "entryAccepted")]
    EntryAccepted,
    /// Admin-channel notification of any lifecycle transition
    #[serde(rename = "poolUpdate")]
    PoolUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEvent {
    #[serde(rename = "event")]
    pub kind: DispatchEventKind,
    #[serde(flatten)]
    pub audience: Audience,
    pub entry_id: i32,
    /// Entry status after the transition (string form)
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Milliseconds since epoch
    pub timestamp: i64,
}

impl DispatchEvent {
    pub fn new(kind: DispatchEventKind, audience: Audience, entry_id: i32, status: String) -> Self {
        Self {
            kind,
            audience,
            entry_id,
            status,
            payload: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
