//! Reorder alert hook.
//!
//! Called after commit for every touched part whose stock has fallen below
//! its reorder point. Purchasing integrations plug in here; the default just
//! logs.

use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

use forgemrp_inventory::StockItem;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("reorder alert delivery failed: {0}")]
    Delivery(String),
}

pub trait ReorderAlert: Send + Sync {
    fn reorder_needed(&self, item: &StockItem) -> Result<(), AlertError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReorderAlert;

impl ReorderAlert for LoggingReorderAlert {
    fn reorder_needed(&self, item: &StockItem) -> Result<(), AlertError> {
        warn!(
            part = %item.part(),
            on_hand = %item.on_hand(),
            available = %item.available(),
            reorder_point = ?item.reorder_point().map(|q| q.to_string()),
            reorder_qty = ?item.reorder_qty().map(|q| q.to_string()),
            "stock below reorder point"
        );
        Ok(())
    }
}

/// Collects alerted items (tests).
#[derive(Debug, Default)]
pub struct CollectingReorderAlert {
    alerted: Mutex<Vec<StockItem>>,
}

impl CollectingReorderAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerted(&self) -> Vec<StockItem> {
        self.alerted.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl ReorderAlert for CollectingReorderAlert {
    fn reorder_needed(&self, item: &StockItem) -> Result<(), AlertError> {
        self.alerted
            .lock()
            .map_err(|_| AlertError::Delivery("alert buffer lock poisoned".into()))?
            .push(item.clone());
        Ok(())
    }
}
