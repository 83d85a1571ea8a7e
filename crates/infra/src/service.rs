//! Fulfillment service: the store plus its post-commit collaborators.
//!
//! Every mutation runs the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. store unit of work (load → decide → persist → commit)
//!   ↓
//! 2. publish change envelopes to the bus
//!   ↓
//! 3. hand an audit record to the sink
//!   ↓
//! 4. fire reorder alerts for touched parts at/below their reorder point
//! ```
//!
//! Steps 2-4 only run after a successful commit and are fire-and-forget:
//! their failures are logged with `warn!` and never reach the caller.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tracing::{info, warn};

use forgemrp_core::{PartKey, Quantity, SerialNumber, WorkOrderId};
use forgemrp_events::{ChangeEnvelope, Event, EventBus};
use forgemrp_inventory::{InventoryEvent, Reservation, StockItem, StockMovement, StockTransaction};
use forgemrp_production::{
    BomLine, KitReport, NewWorkOrder, ProductionEvent, Requirement, SerialStatus, TraceRecord,
    UnitSerial, WorkOrder, WorkOrderPatch,
};

use crate::alerts::{LoggingReorderAlert, ReorderAlert};
use crate::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::store::{
    Committed, DeletedWorkOrder, MrpStore, SerialRequest, StoreResult, UpdatedWorkOrder,
};

pub struct FulfillmentService<B> {
    store: Arc<dyn MrpStore>,
    bus: B,
    audit: Arc<dyn AuditSink>,
    alerts: Arc<dyn ReorderAlert>,
}

impl<B> FulfillmentService<B> {
    /// Service with the default collaborators (tracing audit, logging alerts).
    pub fn new(store: Arc<dyn MrpStore>, bus: B) -> Self {
        Self {
            store,
            bus,
            audit: Arc::new(TracingAuditSink),
            alerts: Arc::new(LoggingReorderAlert),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn ReorderAlert>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn store(&self) -> &dyn MrpStore {
        self.store.as_ref()
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> FulfillmentService<B>
where
    B: EventBus<ChangeEnvelope>,
{
    // Work orders

    pub async fn create_work_order(&self, new: NewWorkOrder) -> StoreResult<WorkOrder> {
        let order = self.store.create_work_order(new).await?;
        info!(
            work_order_id = %order.id_typed(),
            assembly = %order.assembly(),
            quantity = %order.quantity(),
            "work order created"
        );

        self.publish_production(&ProductionEvent::WorkOrderCreated {
            work_order_id: order.id_typed(),
            assembly: order.assembly().clone(),
            quantity: order.quantity(),
            occurred_at: order.created_at(),
        });
        self.audit(
            "work_order.created",
            "work_order",
            order.id_typed().to_string(),
            json!({
                "assembly": order.assembly(),
                "quantity": order.quantity(),
                "status": order.status(),
            }),
        );
        Ok(order)
    }

    pub async fn work_order(&self, id: WorkOrderId) -> StoreResult<WorkOrder> {
        self.store.work_order(id).await
    }

    pub async fn update_work_order(
        &self,
        id: WorkOrderId,
        patch: WorkOrderPatch,
    ) -> StoreResult<UpdatedWorkOrder> {
        let committed = self.store.update_work_order(id, patch).await?;
        let UpdatedWorkOrder { order, outcome } = &committed.value;

        if let Some(to) = outcome.transition {
            info!(
                work_order_id = %id,
                from = %outcome.previous_status,
                to = %to,
                settled_lines = outcome.settlement.as_ref().map(|s| s.lines.len()).unwrap_or(0),
                "work order transitioned"
            );
            self.publish_production(&ProductionEvent::WorkOrderStatusChanged {
                work_order_id: id,
                from: outcome.previous_status,
                to,
                settlement: outcome.settlement.as_ref().map(|s| s.kind),
                occurred_at: order.updated_at(),
            });
        } else {
            info!(work_order_id = %id, "work order updated");
        }
        self.audit(
            "work_order.updated",
            "work_order",
            id.to_string(),
            json!({
                "from": outcome.previous_status,
                "to": order.status(),
                "qty_good": order.qty_good(),
                "qty_scrap": order.qty_scrap(),
                "settlement": outcome.settlement,
            }),
        );
        Ok(self.after_ledger(committed))
    }

    pub async fn delete_work_order(&self, id: WorkOrderId) -> StoreResult<DeletedWorkOrder> {
        let committed = self.store.delete_work_order(id).await?;
        let deleted = &committed.value;
        info!(
            work_order_id = %id,
            serials_removed = deleted.serials_removed,
            released_lines = deleted.released.lines.len(),
            "work order deleted"
        );

        self.publish_production(&ProductionEvent::WorkOrderDeleted {
            work_order_id: id,
            serials_removed: deleted.serials_removed,
            occurred_at: Utc::now(),
        });
        self.audit(
            "work_order.deleted",
            "work_order",
            id.to_string(),
            json!({
                "serials_removed": deleted.serials_removed,
                "released": deleted.released,
            }),
        );
        Ok(self.after_ledger(committed))
    }

    pub async fn kit_work_order(&self, id: WorkOrderId) -> StoreResult<KitReport> {
        let committed = self.store.kit_work_order(id).await?;
        let report = &committed.value;
        info!(
            work_order_id = %id,
            status = report.status.as_str(),
            lines = report.lines.len(),
            "work order kitted"
        );

        self.publish_production(&ProductionEvent::WorkOrderKitted {
            work_order_id: id,
            status: report.status,
            occurred_at: Utc::now(),
        });
        self.audit("work_order.kitted", "work_order", id.to_string(), json!(report));
        Ok(self.after_ledger(committed))
    }

    pub async fn reservations(&self, id: WorkOrderId) -> StoreResult<Vec<Reservation>> {
        self.store.reservations(id).await
    }

    // Serials

    pub async fn assign_serial(
        &self,
        id: WorkOrderId,
        request: SerialRequest,
    ) -> StoreResult<UnitSerial> {
        let unit = self.store.assign_serial(id, request).await?;
        info!(work_order_id = %id, serial = %unit.serial(), "serial assigned");

        self.publish_production(&ProductionEvent::SerialAssigned {
            serial: unit.serial().clone(),
            work_order_id: id,
            occurred_at: unit.created_at(),
        });
        self.audit(
            "serial.assigned",
            "unit_serial",
            unit.serial().to_string(),
            json!({ "work_order_id": id, "status": unit.status() }),
        );
        Ok(unit)
    }

    pub async fn serials(&self, id: WorkOrderId) -> StoreResult<Vec<UnitSerial>> {
        self.store.serials(id).await
    }

    pub async fn trace_serial(&self, serial: &SerialNumber) -> StoreResult<TraceRecord> {
        self.store.trace_serial(serial).await
    }

    pub async fn transition_serial(
        &self,
        serial: &SerialNumber,
        to: SerialStatus,
        notes: Option<String>,
    ) -> StoreResult<UnitSerial> {
        let transition = self.store.transition_serial(serial, to, notes).await?;
        let unit = transition.unit;
        info!(serial = %serial, from = %transition.previous, to = %to, "serial transitioned");

        self.publish_production(&ProductionEvent::SerialStatusChanged {
            serial: serial.clone(),
            from: transition.previous,
            to,
            occurred_at: unit.updated_at(),
        });
        self.audit(
            "serial.status_changed",
            "unit_serial",
            serial.to_string(),
            json!({ "from": transition.previous, "to": to }),
        );
        Ok(unit)
    }

    // Inventory

    pub async fn stock(&self, part: &PartKey) -> StoreResult<StockItem> {
        self.store.stock(part).await
    }

    pub async fn record_movement(
        &self,
        part: &PartKey,
        movement: StockMovement,
        reference: String,
    ) -> StoreResult<StockItem> {
        let committed = self
            .store
            .record_movement(part, movement, reference.clone())
            .await?;
        info!(
            part = %part,
            kind = %movement.kind(),
            delta = %movement.delta(),
            on_hand = %committed.value.on_hand(),
            "stock movement recorded"
        );
        self.audit(
            "inventory.movement_recorded",
            "stock_item",
            part.to_string(),
            json!({
                "kind": movement.kind(),
                "delta": movement.delta(),
                "reference": reference,
            }),
        );
        Ok(self.after_ledger(committed))
    }

    pub async fn transactions(&self, part: &PartKey) -> StoreResult<Vec<StockTransaction>> {
        self.store.transactions(part).await
    }

    pub async fn set_reorder(
        &self,
        part: &PartKey,
        point: Option<Quantity>,
        qty: Option<Quantity>,
    ) -> StoreResult<StockItem> {
        let committed = self.store.set_reorder(part, point, qty).await?;
        info!(part = %part, "reorder metadata updated");
        self.audit(
            "inventory.reorder_set",
            "stock_item",
            part.to_string(),
            json!({ "reorder_point": point, "reorder_qty": qty }),
        );
        Ok(self.after_ledger(committed))
    }

    // BOM

    pub async fn upsert_bom_line(&self, line: BomLine) -> StoreResult<BomLine> {
        let line = self.store.upsert_bom_line(line).await?;
        info!(parent = %line.parent(), child = %line.child(), qty_per = %line.qty_per(), "bom line upserted");
        self.audit(
            "bom.line_upserted",
            "bom_line",
            format!("{}/{}", line.parent(), line.child()),
            json!({ "qty_per": line.qty_per() }),
        );
        Ok(line)
    }

    pub async fn bom_lines(&self, parent: &PartKey) -> StoreResult<Vec<BomLine>> {
        self.store.bom_lines(parent).await
    }

    pub async fn explode_bom(&self, parent: &PartKey, qty: Quantity) -> StoreResult<Vec<Requirement>> {
        self.store.explode_bom(parent, qty).await
    }

    // Post-commit plumbing

    /// Publish ledger side effects of a committed unit of work and hand back
    /// its value.
    fn after_ledger<T>(&self, committed: Committed<T>) -> T {
        for tx in &committed.transactions {
            self.publish_inventory(&InventoryEvent::stock_moved(tx));
        }

        let now = Utc::now();
        for item in &committed.reorder {
            if let Some(event) = InventoryEvent::reorder_point_reached(item, now) {
                self.publish_inventory(&event);
            }
            if let Err(err) = self.alerts.reorder_needed(item) {
                warn!(part = %item.part(), error = %err, "reorder alert failed");
            }
        }
        committed.value
    }

    fn publish_production(&self, event: &ProductionEvent) {
        let (entity, entity_id) = event.subject();
        self.publish(entity, entity_id, event);
    }

    fn publish_inventory(&self, event: &InventoryEvent) {
        self.publish("stock_item", event.part().to_string(), event);
    }

    fn publish<E>(&self, entity: &str, entity_id: String, event: &E)
    where
        E: Event + Serialize,
    {
        let envelope = match ChangeEnvelope::from_event(entity, entity_id, event) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(event_type = event.event_type(), error = %err, "change notice serialization failed");
                return;
            }
        };
        if let Err(err) = self.bus.publish(envelope) {
            warn!(event_type = event.event_type(), error = ?err, "change notice publish failed");
        }
    }

    fn audit(&self, action: &str, entity: &str, entity_id: String, detail: JsonValue) {
        if let Err(err) = self.audit.record(AuditRecord::new(action, entity, entity_id, detail)) {
            warn!(action, error = %err, "audit record dropped");
        }
    }
}
