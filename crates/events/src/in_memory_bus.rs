//! In-process change bus (dev, tests, single-node deployments).

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("event bus lock poisoned")]
    Poisoned,
}

type Filter<M> = Box<dyn Fn(&M) -> bool + Send + Sync>;

struct Subscriber<M> {
    tx: mpsc::Sender<M>,
    filter: Option<Filter<M>>,
}

impl<M> Subscriber<M> {
    fn wants(&self, message: &M) -> bool {
        self.filter.as_ref().is_none_or(|f| f(message))
    }
}

/// Synchronous fan-out over std channels.
///
/// Publishing never blocks on a slow consumer (channels are unbounded) and
/// subscribers whose receiving end was dropped are pruned on the next publish.
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<Subscriber<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the messages matching `filter` only, e.g. envelopes for
    /// one entity kind.
    pub fn subscribe_where(
        &self,
        filter: impl Fn(&M) -> bool + Send + Sync + 'static,
    ) -> Subscription<M> {
        self.attach(Some(Box::new(filter)))
    }

    /// Live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn attach(&self, filter: Option<Filter<M>>) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        // A poisoned lock still yields a subscription; it just never receives.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber { tx, filter });
        }
        Subscription::new(rx)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|sub| !sub.wants(&message) || sub.tx.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        self.attach(None)
    }
}
