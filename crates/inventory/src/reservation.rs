use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgemrp_core::{PartKey, Quantity, WorkOrderId};

/// Quantity of one component held by one work order.
///
/// The aggregate `StockItem::reserved` for a part is always the sum of the
/// reservation rows for that part; settlement retires this row, never the
/// aggregate directly, so one order cannot consume another order's claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub work_order_id: WorkOrderId,
    pub part: PartKey,
    pub quantity: Quantity,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn key(&self) -> (WorkOrderId, PartKey) {
        (self.work_order_id, self.part.clone())
    }

    /// A zero-quantity reservation is a tombstone: stores delete the row.
    pub fn is_released(&self) -> bool {
        self.quantity.is_zero()
    }
}
