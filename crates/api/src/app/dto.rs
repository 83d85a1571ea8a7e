use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use forgemrp_core::{DomainError, PartKey, Quantity, SerialNumber, WorkOrderId};
use forgemrp_inventory::{Reservation, StockItem, StockTransaction, TransactionKind};
use forgemrp_production::{
    BomLine, Priority, SerialStatus, SettlementReport, TraceRecord, UnitSerial, WorkOrder,
    WorkOrderStatus,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateWorkOrderRequest {
    #[serde(alias = "assembly_part_key")]
    pub assembly: String,
    pub quantity: Decimal,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateWorkOrderRequest {
    pub status: Option<String>,
    pub qty_good: Option<Decimal>,
    pub qty_scrap: Option<Decimal>,
    pub priority: Option<String>,
    /// Absent leaves the due date alone; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<NaiveDate>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignSerialRequest {
    pub serial_number: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SerialStatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StockMovementRequest {
    pub kind: String,
    pub quantity: Decimal,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub reorder_point: Option<Decimal>,
    pub reorder_qty: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct BomLineRequest {
    pub qty_per: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ExplodeQuery {
    pub qty: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStreamQuery {
    pub entity: Option<String>,
}

/// Marks a field as present even when its value is `null`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct WorkOrderResponse {
    pub id: WorkOrderId,
    pub reference: String,
    pub assembly: PartKey,
    pub quantity: Quantity,
    pub qty_good: Quantity,
    pub qty_scrap: Quantity,
    pub status: WorkOrderStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementReport>,
}

impl From<&WorkOrder> for WorkOrderResponse {
    fn from(wo: &WorkOrder) -> Self {
        Self {
            id: wo.id_typed(),
            reference: wo.id_typed().reference(),
            assembly: wo.assembly().clone(),
            quantity: wo.quantity(),
            qty_good: wo.qty_good(),
            qty_scrap: wo.qty_scrap(),
            status: wo.status(),
            priority: wo.priority(),
            due_date: wo.due_date(),
            notes: wo.notes().map(str::to_string),
            created_at: wo.created_at(),
            started_at: wo.started_at(),
            completed_at: wo.completed_at(),
            updated_at: wo.updated_at(),
            settlement: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub part_key: PartKey,
    pub on_hand: Quantity,
    pub reserved: Quantity,
    pub available: Quantity,
    pub reorder_point: Option<Quantity>,
    pub reorder_qty: Option<Quantity>,
    pub needs_reorder: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&StockItem> for StockResponse {
    fn from(item: &StockItem) -> Self {
        Self {
            part_key: item.part().clone(),
            on_hand: item.on_hand(),
            reserved: item.reserved(),
            available: item.available(),
            reorder_point: item.reorder_point(),
            reorder_qty: item.reorder_qty(),
            needs_reorder: item.needs_reorder(),
            updated_at: item.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: uuid::Uuid,
    pub part_key: PartKey,
    pub kind: TransactionKind,
    pub delta: Decimal,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl From<&StockTransaction> for TransactionResponse {
    fn from(t: &StockTransaction) -> Self {
        Self {
            id: t.id,
            part_key: t.part.clone(),
            kind: t.kind,
            delta: t.delta,
            reference: t.reference.clone(),
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub work_order_id: WorkOrderId,
    pub part_key: PartKey,
    pub quantity: Quantity,
    pub updated_at: DateTime<Utc>,
}

impl From<&Reservation> for ReservationResponse {
    fn from(r: &Reservation) -> Self {
        Self {
            work_order_id: r.work_order_id,
            part_key: r.part.clone(),
            quantity: r.quantity,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SerialResponse {
    pub serial_number: SerialNumber,
    pub work_order_id: WorkOrderId,
    pub status: SerialStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UnitSerial> for SerialResponse {
    fn from(u: &UnitSerial) -> Self {
        Self {
            serial_number: u.serial().clone(),
            work_order_id: u.work_order_id(),
            status: u.status(),
            notes: u.notes().map(str::to_string),
            created_at: u.created_at(),
            updated_at: u.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TraceResponse {
    #[serde(flatten)]
    pub unit: SerialResponse,
    pub assembly: PartKey,
    pub work_order_status: WorkOrderStatus,
}

impl From<&TraceRecord> for TraceResponse {
    fn from(t: &TraceRecord) -> Self {
        Self {
            unit: SerialResponse::from(&t.unit),
            assembly: t.assembly.clone(),
            work_order_status: t.work_order_status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BomLineResponse {
    pub parent: PartKey,
    pub child: PartKey,
    pub qty_per: Quantity,
}

impl From<&BomLine> for BomLineResponse {
    fn from(l: &BomLine) -> Self {
        Self {
            parent: l.parent().clone(),
            child: l.child().clone(),
            qty_per: l.qty_per(),
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_work_order_id(s: &str) -> Result<WorkOrderId, axum::response::Response> {
    s.parse::<WorkOrderId>()
        .map_err(errors::domain_error_to_response)
}

pub fn parse_part(s: &str) -> Result<PartKey, axum::response::Response> {
    PartKey::parse(s).map_err(errors::domain_error_to_response)
}

pub fn parse_serial(s: &str) -> Result<SerialNumber, axum::response::Response> {
    SerialNumber::parse(s).map_err(errors::domain_error_to_response)
}

/// Parse an optional enum field (status, priority, kind) with its domain `FromStr`.
pub fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.map(str::parse::<T>)
        .transpose()
        .map_err(errors::domain_error_to_response)
}

pub fn quantity(value: Decimal, field: &str) -> Result<Quantity, axum::response::Response> {
    Quantity::new(value)
        .map_err(|e| errors::domain_error_to_response(DomainError::validation(format!("{field}: {e}"))))
}

pub fn positive_quantity(value: Decimal, field: &str) -> Result<Quantity, axum::response::Response> {
    Quantity::positive(value, field).map_err(errors::domain_error_to_response)
}

pub fn opt_quantity(value: Option<Decimal>, field: &str) -> Result<Option<Quantity>, axum::response::Response> {
    value.map(|v| quantity(v, field)).transpose()
}
