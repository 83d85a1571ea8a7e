//! Inventory ledger domain module.
//!
//! This crate owns the only code paths that change on-hand or reserved
//! quantities. Everything is deterministic domain logic (no IO, no HTTP, no
//! storage): stores load rows into a [`LedgerView`], domain code mutates the
//! view, and the store persists [`LedgerChanges`] atomically.

pub mod events;
pub mod ledger;
pub mod reservation;
pub mod stock;
pub mod transaction;

pub use events::{InventoryEvent, ReorderPointReached, StockMoved};
pub use ledger::{LedgerChanges, LedgerView};
pub use reservation::Reservation;
pub use stock::StockItem;
pub use transaction::{StockMovement, StockTransaction, TransactionKind};
