//! Infrastructure layer: storage backends and post-commit collaborators.

pub mod alerts;
pub mod audit;
pub mod service;
pub mod store;

pub use alerts::{AlertError, CollectingReorderAlert, LoggingReorderAlert, ReorderAlert};
pub use audit::{AuditError, AuditRecord, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use service::FulfillmentService;
pub use store::{
    Committed, DeletedWorkOrder, InMemoryMrpStore, MrpStore, PostgresMrpStore, SerialRequest,
    SerialTransition, StoreError, StoreResult, UpdatedWorkOrder,
};
