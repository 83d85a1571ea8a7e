//! Audit trail collaborator.
//!
//! The fulfillment service hands one [`AuditRecord`] per committed mutation to
//! an [`AuditSink`]. Sinks are fire-and-forget: a failing sink is logged by the
//! caller and never undoes the change.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Dotted action name, e.g. `work_order.updated`.
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: JsonValue,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        action: impl Into<String>,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        detail: JsonValue,
    ) -> Self {
        Self {
            action: action.into(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            detail,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Default sink: one structured `tracing` event per record under the `audit`
/// target, so log shipping picks it up with the rest of the JSON output.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        info!(
            target: "audit",
            action = %record.action,
            entity = %record.entity,
            entity_id = %record.entity_id,
            detail = %record.detail,
            "audit"
        );
        Ok(())
    }
}

/// Keeps records in memory (tests, local tooling).
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .map_err(|_| AuditError::Unavailable("audit buffer lock poisoned".into()))?
            .push(record);
        Ok(())
    }
}
