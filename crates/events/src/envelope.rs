use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::event::Event;

/// Envelope for a change notification.
///
/// Subscribers (websocket fan-out, cache invalidation, audit shippers) only see
/// envelopes: the payload is the serialized domain event, tagged with the kind
/// and identifier of the record that changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    event_id: Uuid,
    entity: String,
    entity_id: String,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,
    payload: JsonValue,
}

impl ChangeEnvelope {
    pub fn new(
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        event_type: impl Into<String>,
        event_version: u32,
        occurred_at: DateTime<Utc>,
        payload: JsonValue,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            event_type: event_type.into(),
            event_version,
            occurred_at,
            payload,
        }
    }

    /// Wrap a typed domain event, serializing it as the payload.
    pub fn from_event<E>(
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        event: &E,
    ) -> Result<Self, serde_json::Error>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event)?;
        Ok(Self::new(
            entity,
            entity_id,
            event.event_type(),
            event.version(),
            event.occurred_at(),
            payload,
        ))
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }
}
