//! Append-only audit event model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_CREATED: &str = "created";
pub const EVENT_UPDATED: &str = "updated";
pub const EVENT_STATE_CHANGED: &str = "state_changed";
pub const EVENT_ATTACHED: &str = "attached";
pub const EVENT_COPIED: &str = "copied";

/// Kind of resource an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Container,
    Task,
    Attachment,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Task => "task",
            Self::Attachment => "attachment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "container" => Some(Self::Container),
            "task" => Some(Self::Task),
            "attachment" => Some(Self::Attachment),
            _ => None,
        }
    }
}

/// Event to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub actor: String,
    pub resource_type: ResourceType,
    pub resource_uuid: Uuid,
    pub event_type: &'static str,
    /// Opaque facts about what happened.
    pub payload: serde_json::Value,
}

/// Persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub actor: String,
    pub resource_type: ResourceType,
    pub resource_uuid: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
}
