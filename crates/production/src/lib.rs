//! Production domain module: work-order fulfillment.
//!
//! Pure, deterministic domain logic (no IO, no HTTP, no storage):
//!
//! - [`bom`]: BOM requirement resolution (single level) and multi-level explosion
//! - [`allocation`]: kitting, i.e. reserving a work order's components
//! - [`work_order`]: the work-order status state machine
//! - [`settlement`]: consuming or releasing reservations when an order finishes
//! - [`serial`]: unit serial generation and traceability records

pub mod allocation;
pub mod bom;
pub mod events;
pub mod serial;
pub mod settlement;
pub mod work_order;

pub use allocation::{KitLine, KitReport, LineStatus, kit};
pub use bom::{BomIndex, BomLine, BomSource, MAX_BOM_DEPTH, Requirement, explode, resolve_requirements};
pub use events::ProductionEvent;
pub use serial::{SerialStatus, TraceRecord, UnitSerial, generate_serial, serial_prefix};
pub use settlement::{SettledLine, SettlementKind, SettlementReport, settle_cancellation, settle_completion};
pub use work_order::{
    NewWorkOrder, Priority, UpdateOutcome, WorkOrder, WorkOrderPatch, WorkOrderStatus,
};
