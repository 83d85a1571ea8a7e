//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is for distribution, not storage: the store is the source of truth
//! and envelopes are published only after a commit. Delivery is best-effort
//! and consumers must tolerate duplicates and gaps.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream (broadcast semantics: every subscriber
/// receives its own copy of each published message).
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish()` can fail; callers in this workspace treat that as a logged,
/// non-fatal condition because the change it describes is already committed.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
