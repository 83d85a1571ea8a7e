//! `forgemrp-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, exact quantities and the shared error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod quantity;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{PartKey, SerialNumber, WorkOrderId};
pub use quantity::Quantity;
