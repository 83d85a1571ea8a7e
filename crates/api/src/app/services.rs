use std::{convert::Infallible, sync::Arc, time::Duration};

use anyhow::Context;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use forgemrp_events::{ChangeEnvelope, EventBus, InMemoryBusError, InMemoryEventBus, Subscription};
use forgemrp_infra::{FulfillmentService, InMemoryMrpStore, MrpStore, PostgresMrpStore};

use crate::config::StoreConfig;

/// Buffered change notices per SSE subscriber before it starts lagging.
const REALTIME_CAPACITY: usize = 1024;

/// Change bus for the HTTP process: in-process subscribers via
/// [`InMemoryEventBus`], plus a tokio broadcast channel feeding SSE clients.
#[derive(Debug)]
pub struct ChangeFanout {
    local: InMemoryEventBus<ChangeEnvelope>,
    realtime_tx: broadcast::Sender<ChangeEnvelope>,
}

impl ChangeFanout {
    pub fn new() -> Self {
        let (realtime_tx, _) = broadcast::channel(REALTIME_CAPACITY);
        Self {
            local: InMemoryEventBus::new(),
            realtime_tx,
        }
    }

    pub fn realtime(&self) -> broadcast::Receiver<ChangeEnvelope> {
        self.realtime_tx.subscribe()
    }
}

impl Default for ChangeFanout {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus<ChangeEnvelope> for ChangeFanout {
    type Error = InMemoryBusError;

    fn publish(&self, message: ChangeEnvelope) -> Result<(), Self::Error> {
        // No SSE client connected is not a failure.
        let _ = self.realtime_tx.send(message.clone());
        self.local.publish(message)
    }

    fn subscribe(&self) -> Subscription<ChangeEnvelope> {
        self.local.subscribe()
    }
}

pub type Fulfillment = FulfillmentService<Arc<ChangeFanout>>;

/// Everything handlers need, shared behind an `Arc` extension.
pub struct AppServices {
    fulfillment: Fulfillment,
    changes: Arc<ChangeFanout>,
}

impl AppServices {
    pub fn new(store: Arc<dyn MrpStore>) -> Self {
        let changes = Arc::new(ChangeFanout::new());
        Self {
            fulfillment: FulfillmentService::new(store, changes.clone()),
            changes,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryMrpStore::new()))
    }

    pub fn fulfillment(&self) -> &Fulfillment {
        &self.fulfillment
    }

    pub fn changes(&self) -> &ChangeFanout {
        &self.changes
    }

    pub fn backend(&self) -> &'static str {
        self.fulfillment.store().backend()
    }
}

pub async fn build_services(store: &StoreConfig) -> anyhow::Result<AppServices> {
    match store {
        StoreConfig::InMemory => {
            tracing::info!(backend = "in_memory", "store ready");
            Ok(AppServices::in_memory())
        }
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let pg = PostgresMrpStore::connect(database_url, *max_connections)
                .await
                .context("failed to connect to postgres")?;
            pg.migrate().await.context("failed to apply schema")?;
            tracing::info!(backend = "postgres", max_connections, "store ready");
            Ok(AppServices::new(Arc::new(pg)))
        }
    }
}

/// Server-sent change notices, optionally narrowed to one entity kind.
pub fn change_stream(
    services: Arc<AppServices>,
    entity: Option<String>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.changes().realtime();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(envelope) if entity.as_deref().is_none_or(|e| e == envelope.entity()) => {
            let data = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default()
                .event(envelope.event_type().to_string())
                .data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
