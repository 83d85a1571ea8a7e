//! Change notification: domain events, envelopes and the pub/sub bus.
//!
//! Mutations in the fulfillment core publish a [`ChangeEnvelope`] *after* their
//! store transaction commits. Delivery is fire-and-forget: a failed publish is
//! logged by the caller and never undoes the committed change.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::ChangeEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
