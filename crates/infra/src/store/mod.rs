//! Transactional storage for the fulfillment core.
//!
//! Every mutating operation runs as one unit of work: load the rows it
//! touches, decide with pure domain code on a [`LedgerView`], persist the
//! changed rows and appended transactions, commit. Nothing is published from
//! here; [`crate::service::FulfillmentService`] publishes after the store
//! returns.
//!
//! [`LedgerView`]: forgemrp_inventory::LedgerView

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use forgemrp_core::{DomainError, PartKey, Quantity, SerialNumber, WorkOrderId};
use forgemrp_inventory::{LedgerChanges, Reservation, StockItem, StockMovement, StockTransaction};
use forgemrp_production::{
    BomLine, KitReport, NewWorkOrder, Requirement, SerialStatus, SettlementReport, TraceRecord,
    UnitSerial, UpdateOutcome, WorkOrder, WorkOrderPatch,
};

pub use in_memory::InMemoryMrpStore;
pub use postgres::PostgresMrpStore;

/// How many `-N` suffixes serial generation tries before giving up.
pub const MAX_SERIAL_ATTEMPTS: u32 = 100;

/// Store operation error.
///
/// `Domain` carries deterministic business failures (validation, conflict,
/// not found, invariant) detected before or during the unit of work; the
/// whole operation was rolled back. `Backend` is an infrastructure failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        StoreError::Backend(msg.into())
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            StoreError::Domain(e) => Some(e),
            StoreError::Backend(_) => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A committed unit of work plus the ledger side effects it produced, so the
/// caller can publish them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed<T> {
    pub value: T,
    /// Transactions appended by this unit of work.
    pub transactions: Vec<StockTransaction>,
    /// Touched parts now below their reorder point.
    pub reorder: Vec<StockItem>,
}

impl<T> Committed<T> {
    pub fn new(value: T, transactions: Vec<StockTransaction>, reorder: Vec<StockItem>) -> Self {
        Self {
            value,
            transactions,
            reorder,
        }
    }

    /// Split a finished ledger view's changes into what to persist and what to
    /// report.
    pub(crate) fn from_changes(value: T, changes: &LedgerChanges, reorder: Vec<StockItem>) -> Self {
        Self::new(value, changes.transactions.clone(), reorder)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedWorkOrder {
    pub order: WorkOrder,
    pub outcome: UpdateOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedWorkOrder {
    pub work_order_id: WorkOrderId,
    pub serials_removed: usize,
    pub released: SettlementReport,
}

/// Unit registration request. `serial: None` asks the store to generate one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialRequest {
    pub serial: Option<SerialNumber>,
    pub status: Option<SerialStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialTransition {
    pub previous: SerialStatus,
    pub unit: UnitSerial,
}

/// Storage boundary for work orders, the inventory ledger, BOM lines and
/// unit serials.
///
/// Implementations must run each mutating method atomically: on `Err` no
/// row has changed. Reads are point-in-time snapshots.
#[async_trait]
pub trait MrpStore: Send + Sync {
    /// Short backend name for health reporting.
    fn backend(&self) -> &'static str;

    async fn create_work_order(&self, new: NewWorkOrder) -> StoreResult<WorkOrder>;

    async fn work_order(&self, id: WorkOrderId) -> StoreResult<WorkOrder>;

    /// Apply a patch; moving to `completed`/`cancelled` settles reservations in
    /// the same unit of work.
    async fn update_work_order(
        &self,
        id: WorkOrderId,
        patch: WorkOrderPatch,
    ) -> StoreResult<Committed<UpdatedWorkOrder>>;

    /// Release the order's reservations, then delete it with its serials.
    async fn delete_work_order(&self, id: WorkOrderId) -> StoreResult<Committed<DeletedWorkOrder>>;

    /// Reserve available stock towards the order's single-level BOM.
    async fn kit_work_order(&self, id: WorkOrderId) -> StoreResult<Committed<KitReport>>;

    async fn reservations(&self, id: WorkOrderId) -> StoreResult<Vec<Reservation>>;

    async fn assign_serial(&self, id: WorkOrderId, request: SerialRequest) -> StoreResult<UnitSerial>;

    /// Forward trace: units built by an order, in creation order.
    async fn serials(&self, id: WorkOrderId) -> StoreResult<Vec<UnitSerial>>;

    /// Reverse trace: the unit with its owning order and assembly.
    async fn trace_serial(&self, serial: &SerialNumber) -> StoreResult<TraceRecord>;

    async fn transition_serial(
        &self,
        serial: &SerialNumber,
        to: SerialStatus,
        notes: Option<String>,
    ) -> StoreResult<SerialTransition>;

    /// Current stock row; unknown parts read as an all-zero row.
    async fn stock(&self, part: &PartKey) -> StoreResult<StockItem>;

    async fn record_movement(
        &self,
        part: &PartKey,
        movement: StockMovement,
        reference: String,
    ) -> StoreResult<Committed<StockItem>>;

    /// Ledger history for a part, oldest first.
    async fn transactions(&self, part: &PartKey) -> StoreResult<Vec<StockTransaction>>;

    async fn set_reorder(
        &self,
        part: &PartKey,
        point: Option<Quantity>,
        qty: Option<Quantity>,
    ) -> StoreResult<Committed<StockItem>>;

    /// Insert or replace the `(parent, child)` line.
    async fn upsert_bom_line(&self, line: BomLine) -> StoreResult<BomLine>;

    /// Direct lines of `parent`, sorted by child.
    async fn bom_lines(&self, parent: &PartKey) -> StoreResult<Vec<BomLine>>;

    /// Multi-level explosion down to leaf components.
    async fn explode_bom(&self, parent: &PartKey, qty: Quantity) -> StoreResult<Vec<Requirement>>;
}
