use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use forgemrp_core::{PartKey, Quantity};
use forgemrp_events::Event;

use crate::stock::StockItem;
use crate::transaction::{StockTransaction, TransactionKind};

/// Event: StockMoved (one per appended ledger transaction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub part: PartKey,
    pub kind: TransactionKind,
    pub delta: Decimal,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReorderPointReached.
///
/// Emitted after commit when a touched part's available quantity has fallen
/// below its reorder point; the alerting collaborator listens for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPointReached {
    pub part: PartKey,
    pub on_hand: Quantity,
    pub available: Quantity,
    pub reorder_point: Quantity,
    pub reorder_qty: Option<Quantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    StockMoved(StockMoved),
    ReorderPointReached(ReorderPointReached),
}

impl InventoryEvent {
    pub fn part(&self) -> &PartKey {
        match self {
            InventoryEvent::StockMoved(e) => &e.part,
            InventoryEvent::ReorderPointReached(e) => &e.part,
        }
    }

    pub fn stock_moved(tx: &StockTransaction) -> Self {
        InventoryEvent::StockMoved(StockMoved {
            part: tx.part.clone(),
            kind: tx.kind,
            delta: tx.delta,
            reference: tx.reference.clone(),
            occurred_at: tx.created_at,
        })
    }

    /// `None` unless the item has fallen below its reorder point.
    pub fn reorder_point_reached(item: &StockItem, occurred_at: DateTime<Utc>) -> Option<Self> {
        let reorder_point = item.reorder_point()?;
        if !item.needs_reorder() {
            return None;
        }
        Some(InventoryEvent::ReorderPointReached(ReorderPointReached {
            part: item.part().clone(),
            on_hand: item.on_hand(),
            available: item.available(),
            reorder_point,
            reorder_qty: item.reorder_qty(),
            occurred_at,
        }))
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockMoved(_) => "inventory.stock.moved",
            InventoryEvent::ReorderPointReached(_) => "inventory.stock.reorder_point_reached",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::StockMoved(e) => e.occurred_at,
            InventoryEvent::ReorderPointReached(e) => e.occurred_at,
        }
    }
}
