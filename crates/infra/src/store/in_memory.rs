use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use forgemrp_core::{DomainError, Entity, PartKey, Quantity, SerialNumber, WorkOrderId};
use forgemrp_inventory::{LedgerView, Reservation, StockItem, StockMovement, StockTransaction};
use forgemrp_production::{
    BomIndex, BomLine, KitReport, NewWorkOrder, Requirement, SerialStatus, TraceRecord, UnitSerial,
    WorkOrder, WorkOrderPatch, explode, generate_serial, kit, resolve_requirements,
    settle_cancellation,
};

use super::{
    Committed, DeletedWorkOrder, MAX_SERIAL_ATTEMPTS, MrpStore, SerialRequest, SerialTransition,
    StoreResult, UpdatedWorkOrder,
};

#[derive(Debug, Default)]
struct Tables {
    work_orders: BTreeMap<WorkOrderId, WorkOrder>,
    stock: BTreeMap<PartKey, StockItem>,
    reservations: BTreeMap<(WorkOrderId, PartKey), Reservation>,
    transactions: Vec<StockTransaction>,
    bom: BTreeMap<(PartKey, PartKey), BomLine>,
    serials: BTreeMap<SerialNumber, UnitSerial>,
}

impl Tables {
    fn work_order(&self, id: WorkOrderId) -> Result<&WorkOrder, DomainError> {
        self.work_orders
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("work order {id}")))
    }

    fn bom_for(&self, parent: &PartKey) -> Vec<BomLine> {
        self.bom
            .values()
            .filter(|l| l.parent() == parent)
            .cloned()
            .collect()
    }

    /// Ledger view holding the order's reservations plus the stock rows of
    /// `parts` and of every reserved part.
    fn ledger<'a>(
        &self,
        work_order_id: WorkOrderId,
        parts: impl IntoIterator<Item = &'a PartKey>,
        now: DateTime<Utc>,
    ) -> LedgerView {
        let mut view = LedgerView::new(now);
        for reservation in self
            .reservations
            .values()
            .filter(|r| r.work_order_id == work_order_id)
        {
            if let Some(item) = self.stock.get(&reservation.part) {
                view.load_stock(item.clone());
            }
            view.load_reservation(reservation.clone());
        }
        for part in parts {
            if let Some(item) = self.stock.get(part) {
                view.load_stock(item.clone());
            }
        }
        view
    }

    /// Persist everything the view changed and report it.
    fn commit<T>(&mut self, value: T, view: LedgerView) -> Committed<T> {
        let reorder = view.reorder_candidates();
        let changes = view.into_changes();
        let committed = Committed::from_changes(value, &changes, reorder);

        for item in changes.stock {
            self.stock.insert(item.id().clone(), item);
        }
        for reservation in changes.reservations {
            if reservation.is_released() {
                self.reservations.remove(&reservation.key());
            } else {
                self.reservations.insert(reservation.key(), reservation);
            }
        }
        self.transactions.extend(changes.transactions);
        committed
    }
}

/// In-memory store.
///
/// Intended for tests/dev. One `RwLock` guards every table; mutating calls
/// hold the write guard across load, decide and persist, and stage their
/// changes in a `LedgerView` so a failed decision leaves the tables as they
/// were.
#[derive(Debug, Default)]
pub struct InMemoryMrpStore {
    tables: RwLock<Tables>,
}

impl InMemoryMrpStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock is recovered: every mutation decides on a staged view
    // before it touches the tables, so a panic cannot leave them half-written.
    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T, DomainError>) -> StoreResult<T> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&tables)?)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T, DomainError>) -> StoreResult<T> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut tables)?)
    }
}

#[async_trait]
impl MrpStore for InMemoryMrpStore {
    fn backend(&self) -> &'static str {
        "in_memory"
    }

    async fn create_work_order(&self, new: NewWorkOrder) -> StoreResult<WorkOrder> {
        self.write(|t| {
            let order = WorkOrder::create(WorkOrderId::new(), new, Utc::now())?;
            t.work_orders.insert(*order.id(), order.clone());
            Ok(order)
        })
    }

    async fn work_order(&self, id: WorkOrderId) -> StoreResult<WorkOrder> {
        self.read(|t| t.work_order(id).cloned())
    }

    async fn update_work_order(
        &self,
        id: WorkOrderId,
        patch: WorkOrderPatch,
    ) -> StoreResult<Committed<UpdatedWorkOrder>> {
        self.write(|t| {
            let mut order = t.work_order(id)?.clone();
            let mut view = t.ledger(id, [order.assembly()], Utc::now());
            let outcome = order.apply_update(&patch, &mut view)?;

            t.work_orders.insert(id, order.clone());
            Ok(t.commit(UpdatedWorkOrder { order, outcome }, view))
        })
    }

    async fn delete_work_order(&self, id: WorkOrderId) -> StoreResult<Committed<DeletedWorkOrder>> {
        self.write(|t| {
            t.work_order(id)?;
            let mut view = t.ledger(id, core::iter::empty::<&PartKey>(), Utc::now());
            let released = settle_cancellation(id, &mut view)?;

            t.work_orders.remove(&id);
            let before = t.serials.len();
            t.serials.retain(|_, unit| unit.work_order_id() != id);
            let serials_removed = before - t.serials.len();

            Ok(t.commit(
                DeletedWorkOrder {
                    work_order_id: id,
                    serials_removed,
                    released,
                },
                view,
            ))
        })
    }

    async fn kit_work_order(&self, id: WorkOrderId) -> StoreResult<Committed<KitReport>> {
        self.write(|t| {
            let order = t.work_order(id)?.clone();
            let lines = t.bom_for(order.assembly());
            let requirements = resolve_requirements(order.assembly(), &lines, order.quantity())?;

            let mut view = t.ledger(id, requirements.iter().map(|r| &r.component), Utc::now());
            let report = kit(&order, &requirements, &mut view)?;
            Ok(t.commit(report, view))
        })
    }

    async fn reservations(&self, id: WorkOrderId) -> StoreResult<Vec<Reservation>> {
        self.read(|t| {
            t.work_order(id)?;
            Ok(t.reservations
                .values()
                .filter(|r| r.work_order_id == id)
                .cloned()
                .collect())
        })
    }

    async fn assign_serial(&self, id: WorkOrderId, request: SerialRequest) -> StoreResult<UnitSerial> {
        self.write(|t| {
            let order = t.work_order(id)?.clone();
            let now = Utc::now();

            let serial = match request.serial {
                Some(serial) => {
                    if t.serials.contains_key(&serial) {
                        return Err(DomainError::conflict(format!(
                            "serial {serial} is already assigned"
                        )));
                    }
                    serial
                }
                None => {
                    let mut found = None;
                    for attempt in 1..=MAX_SERIAL_ATTEMPTS {
                        let candidate = generate_serial(order.assembly(), now, attempt)?;
                        if !t.serials.contains_key(&candidate) {
                            found = Some(candidate);
                            break;
                        }
                    }
                    found.ok_or_else(|| {
                        DomainError::conflict("could not generate a unique serial number")
                    })?
                }
            };

            let unit = UnitSerial::assign(&order, serial, request.status, request.notes, now)?;
            t.serials.insert(unit.id().clone(), unit.clone());
            Ok(unit)
        })
    }

    async fn serials(&self, id: WorkOrderId) -> StoreResult<Vec<UnitSerial>> {
        self.read(|t| {
            t.work_order(id)?;
            let mut units: Vec<UnitSerial> = t
                .serials
                .values()
                .filter(|u| u.work_order_id() == id)
                .cloned()
                .collect();
            units.sort_by(|a, b| {
                a.created_at()
                    .cmp(&b.created_at())
                    .then_with(|| a.serial().cmp(b.serial()))
            });
            Ok(units)
        })
    }

    async fn trace_serial(&self, serial: &SerialNumber) -> StoreResult<TraceRecord> {
        self.read(|t| {
            let unit = t
                .serials
                .get(serial)
                .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))?;
            let order = t.work_order(unit.work_order_id())?;
            Ok(TraceRecord::new(unit.clone(), order))
        })
    }

    async fn transition_serial(
        &self,
        serial: &SerialNumber,
        to: SerialStatus,
        notes: Option<String>,
    ) -> StoreResult<SerialTransition> {
        self.write(|t| {
            let mut unit = t
                .serials
                .get(serial)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))?;
            let previous = unit.status();
            unit.transition(to, notes, Utc::now())?;
            t.serials.insert(serial.clone(), unit.clone());
            Ok(SerialTransition { previous, unit })
        })
    }

    async fn stock(&self, part: &PartKey) -> StoreResult<StockItem> {
        self.read(|t| {
            Ok(t.stock
                .get(part)
                .cloned()
                .unwrap_or_else(|| StockItem::new(part.clone(), Utc::now())))
        })
    }

    async fn record_movement(
        &self,
        part: &PartKey,
        movement: StockMovement,
        reference: String,
    ) -> StoreResult<Committed<StockItem>> {
        self.write(|t| {
            let mut view = LedgerView::new(Utc::now());
            if let Some(item) = t.stock.get(part) {
                view.load_stock(item.clone());
            }
            view.apply_movement(part, movement, &reference)?;
            let item = view
                .stock(part)
                .cloned()
                .ok_or_else(|| DomainError::invariant(format!("stock row for {part} vanished")))?;
            Ok(t.commit(item, view))
        })
    }

    async fn transactions(&self, part: &PartKey) -> StoreResult<Vec<StockTransaction>> {
        self.read(|t| {
            Ok(t.transactions
                .iter()
                .filter(|tx| &tx.part == part)
                .cloned()
                .collect())
        })
    }

    async fn set_reorder(
        &self,
        part: &PartKey,
        point: Option<Quantity>,
        qty: Option<Quantity>,
    ) -> StoreResult<Committed<StockItem>> {
        self.write(|t| {
            let mut view = LedgerView::new(Utc::now());
            if let Some(item) = t.stock.get(part) {
                view.load_stock(item.clone());
            }
            view.set_reorder(part, point, qty);
            let item = view
                .stock(part)
                .cloned()
                .ok_or_else(|| DomainError::invariant(format!("stock row for {part} vanished")))?;
            Ok(t.commit(item, view))
        })
    }

    async fn upsert_bom_line(&self, line: BomLine) -> StoreResult<BomLine> {
        self.write(|t| {
            t.bom
                .insert((line.parent().clone(), line.child().clone()), line.clone());
            Ok(line)
        })
    }

    async fn bom_lines(&self, parent: &PartKey) -> StoreResult<Vec<BomLine>> {
        self.read(|t| Ok(t.bom_for(parent)))
    }

    async fn explode_bom(&self, parent: &PartKey, qty: Quantity) -> StoreResult<Vec<Requirement>> {
        self.read(|t| {
            let index = BomIndex::from_lines(t.bom.values().cloned());
            explode(parent, qty, &index)
        })
    }
}
