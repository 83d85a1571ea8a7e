use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgemrp_core::{PartKey, Quantity, SerialNumber, WorkOrderId};
use forgemrp_events::Event;

use crate::allocation::LineStatus;
use crate::serial::SerialStatus;
use crate::settlement::SettlementKind;
use crate::work_order::WorkOrderStatus;

/// Change notices published after a production mutation commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductionEvent {
    WorkOrderCreated {
        work_order_id: WorkOrderId,
        assembly: PartKey,
        quantity: Quantity,
        occurred_at: DateTime<Utc>,
    },
    WorkOrderKitted {
        work_order_id: WorkOrderId,
        status: LineStatus,
        occurred_at: DateTime<Utc>,
    },
    WorkOrderStatusChanged {
        work_order_id: WorkOrderId,
        from: WorkOrderStatus,
        to: WorkOrderStatus,
        settlement: Option<SettlementKind>,
        occurred_at: DateTime<Utc>,
    },
    WorkOrderDeleted {
        work_order_id: WorkOrderId,
        serials_removed: usize,
        occurred_at: DateTime<Utc>,
    },
    SerialAssigned {
        serial: SerialNumber,
        work_order_id: WorkOrderId,
        occurred_at: DateTime<Utc>,
    },
    SerialStatusChanged {
        serial: SerialNumber,
        from: SerialStatus,
        to: SerialStatus,
        occurred_at: DateTime<Utc>,
    },
}

impl ProductionEvent {
    /// Entity name and id used for change envelopes and audit records.
    pub fn subject(&self) -> (&'static str, String) {
        match self {
            ProductionEvent::WorkOrderCreated { work_order_id, .. }
            | ProductionEvent::WorkOrderKitted { work_order_id, .. }
            | ProductionEvent::WorkOrderStatusChanged { work_order_id, .. }
            | ProductionEvent::WorkOrderDeleted { work_order_id, .. } => {
                ("work_order", work_order_id.to_string())
            }
            ProductionEvent::SerialAssigned { serial, .. }
            | ProductionEvent::SerialStatusChanged { serial, .. } => {
                ("unit_serial", serial.to_string())
            }
        }
    }
}

impl Event for ProductionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductionEvent::WorkOrderCreated { .. } => "production.work_order.created",
            ProductionEvent::WorkOrderKitted { .. } => "production.work_order.kitted",
            ProductionEvent::WorkOrderStatusChanged { .. } => "production.work_order.status_changed",
            ProductionEvent::WorkOrderDeleted { .. } => "production.work_order.deleted",
            ProductionEvent::SerialAssigned { .. } => "production.serial.assigned",
            ProductionEvent::SerialStatusChanged { .. } => "production.serial.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductionEvent::WorkOrderCreated { occurred_at, .. }
            | ProductionEvent::WorkOrderKitted { occurred_at, .. }
            | ProductionEvent::WorkOrderStatusChanged { occurred_at, .. }
            | ProductionEvent::WorkOrderDeleted { occurred_at, .. }
            | ProductionEvent::SerialAssigned { occurred_at, .. }
            | ProductionEvent::SerialStatusChanged { occurred_at, .. } => *occurred_at,
        }
    }
}
