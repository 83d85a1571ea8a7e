//! Transaction-scoped view of the inventory ledger.
//!
//! A store opens a transaction, loads the stock rows and reservation rows an
//! operation touches into a `LedgerView`, lets domain code (kitting,
//! settlement, stock movements) mutate the view, then writes back
//! [`LedgerChanges`] and commits. If any step fails the view is dropped and
//! nothing is persisted.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use forgemrp_core::{DomainError, DomainResult, PartKey, Quantity, WorkOrderId};

use crate::reservation::Reservation;
use crate::stock::StockItem;
use crate::transaction::{StockMovement, StockTransaction, TransactionKind};

type ReservationKey = (WorkOrderId, PartKey);

/// Everything a ledger operation changed, ready to be persisted atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerChanges {
    /// Stock rows to upsert (created implicitly if new).
    pub stock: Vec<StockItem>,
    /// Reservation rows to upsert; a zero quantity means delete the row.
    pub reservations: Vec<Reservation>,
    /// Transactions to append.
    pub transactions: Vec<StockTransaction>,
}

impl LedgerChanges {
    pub fn is_empty(&self) -> bool {
        self.stock.is_empty() && self.reservations.is_empty() && self.transactions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LedgerView {
    now: DateTime<Utc>,
    stock: BTreeMap<PartKey, StockItem>,
    reservations: BTreeMap<ReservationKey, Reservation>,
    dirty_stock: BTreeSet<PartKey>,
    dirty_reservations: BTreeSet<ReservationKey>,
    transactions: Vec<StockTransaction>,
}

impl LedgerView {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            stock: BTreeMap::new(),
            reservations: BTreeMap::new(),
            dirty_stock: BTreeSet::new(),
            dirty_reservations: BTreeSet::new(),
            transactions: Vec::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Seed the view with a persisted stock row.
    pub fn load_stock(&mut self, item: StockItem) {
        self.stock.insert(item.part().clone(), item);
    }

    /// Seed the view with a persisted reservation row.
    pub fn load_reservation(&mut self, reservation: Reservation) {
        self.reservations.insert(reservation.key(), reservation);
    }

    pub fn stock(&self, part: &PartKey) -> Option<&StockItem> {
        self.stock.get(part)
    }

    /// Available quantity for a part; unknown parts have nothing available.
    pub fn available(&self, part: &PartKey) -> Quantity {
        self.stock
            .get(part)
            .map(StockItem::available)
            .unwrap_or(Quantity::ZERO)
    }

    /// Quantity of `part` currently held by `work_order_id`.
    pub fn held(&self, work_order_id: WorkOrderId, part: &PartKey) -> Quantity {
        self.reservations
            .get(&(work_order_id, part.clone()))
            .map(|r| r.quantity)
            .unwrap_or(Quantity::ZERO)
    }

    /// Non-empty reservations held by a work order, in part-key order.
    pub fn reservations_for(&self, work_order_id: WorkOrderId) -> Vec<Reservation> {
        self.reservations
            .values()
            .filter(|r| r.work_order_id == work_order_id && !r.is_released())
            .cloned()
            .collect()
    }

    /// Claim `qty` of `part` for a work order.
    pub fn reserve(
        &mut self,
        work_order_id: WorkOrderId,
        part: &PartKey,
        qty: Quantity,
    ) -> DomainResult<()> {
        if qty.is_zero() {
            return Ok(());
        }
        let now = self.now;
        self.stock_entry(part).reserve(qty, now)?;
        let held = self.held(work_order_id, part);
        self.set_held(work_order_id, part, held.checked_add(qty)?);
        Ok(())
    }

    /// Return `qty` of a work order's claim to the pool without touching on hand.
    pub fn release(
        &mut self,
        work_order_id: WorkOrderId,
        part: &PartKey,
        qty: Quantity,
    ) -> DomainResult<()> {
        if qty.is_zero() {
            return Ok(());
        }
        let remaining = self.take_from_reservation(work_order_id, part, qty)?;
        let now = self.now;
        self.stock_entry(part).release(qty, now)?;
        self.set_held(work_order_id, part, remaining);
        Ok(())
    }

    /// Turn `qty` of a work order's claim into real consumption and ledger it
    /// as an `issue`.
    pub fn consume(
        &mut self,
        work_order_id: WorkOrderId,
        part: &PartKey,
        qty: Quantity,
        reference: &str,
    ) -> DomainResult<()> {
        if qty.is_zero() {
            return Ok(());
        }
        let remaining = self.take_from_reservation(work_order_id, part, qty)?;
        let now = self.now;
        self.stock_entry(part).consume(qty, now)?;
        self.set_held(work_order_id, part, remaining);
        self.record(part, TransactionKind::Issue, -qty.value(), reference);
        Ok(())
    }

    /// Apply an operator movement (receipt, scrap, adjustment, ...).
    pub fn apply_movement(
        &mut self,
        part: &PartKey,
        movement: StockMovement,
        reference: &str,
    ) -> DomainResult<()> {
        let now = self.now;
        self.stock_entry(part).adjust(movement.delta(), now)?;
        self.record(part, movement.kind(), movement.delta(), reference);
        Ok(())
    }

    /// Credit finished goods into stock (`receive`).
    pub fn receive(&mut self, part: &PartKey, qty: Quantity, reference: &str) -> DomainResult<()> {
        if qty.is_zero() {
            return Ok(());
        }
        self.apply_movement(part, StockMovement::new(TransactionKind::Receive, qty.value())?, reference)
    }

    /// Replace reorder metadata for a part.
    pub fn set_reorder(&mut self, part: &PartKey, point: Option<Quantity>, qty: Option<Quantity>) {
        let now = self.now;
        self.stock_entry(part).set_reorder(point, qty, now);
    }

    /// Parts touched by this view whose available stock has fallen below their
    /// reorder point.
    pub fn reorder_candidates(&self) -> Vec<StockItem> {
        self.dirty_stock
            .iter()
            .filter_map(|p| self.stock.get(p))
            .filter(|s| s.needs_reorder())
            .cloned()
            .collect()
    }

    pub fn into_changes(self) -> LedgerChanges {
        let LedgerView {
            mut stock,
            mut reservations,
            dirty_stock,
            dirty_reservations,
            transactions,
            ..
        } = self;

        LedgerChanges {
            stock: dirty_stock
                .into_iter()
                .filter_map(|p| stock.remove(&p))
                .collect(),
            reservations: dirty_reservations
                .into_iter()
                .filter_map(|k| reservations.remove(&k))
                .collect(),
            transactions,
        }
    }

    fn stock_entry(&mut self, part: &PartKey) -> &mut StockItem {
        self.dirty_stock.insert(part.clone());
        let now = self.now;
        self.stock
            .entry(part.clone())
            .or_insert_with(|| StockItem::new(part.clone(), now))
    }

    fn take_from_reservation(
        &self,
        work_order_id: WorkOrderId,
        part: &PartKey,
        qty: Quantity,
    ) -> DomainResult<Quantity> {
        self.held(work_order_id, part).checked_sub(qty).ok_or_else(|| {
            DomainError::invariant(format!(
                "work order {work_order_id} holds less than {qty} of {part}"
            ))
        })
    }

    fn set_held(&mut self, work_order_id: WorkOrderId, part: &PartKey, quantity: Quantity) {
        let key = (work_order_id, part.clone());
        self.dirty_reservations.insert(key.clone());
        self.reservations.insert(
            key,
            Reservation {
                work_order_id,
                part: part.clone(),
                quantity,
                updated_at: self.now,
            },
        );
    }

    fn record(&mut self, part: &PartKey, kind: TransactionKind, delta: Decimal, reference: &str) {
        self.transactions.push(StockTransaction {
            id: Uuid::now_v7(),
            part: part.clone(),
            kind,
            delta,
            reference: reference.to_string(),
            created_at: self.now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn part(s: &str) -> PartKey {
        PartKey::parse(s).unwrap()
    }

    fn view_with(p: &PartKey, on_hand: u32) -> LedgerView {
        let mut view = LedgerView::new(Utc::now());
        view.load_stock(
            StockItem::restore(p.clone(), Quantity::from(on_hand), Quantity::ZERO, None, None, Utc::now())
                .unwrap(),
        );
        view
    }

    #[test]
    fn reserve_tracks_both_aggregate_and_claim() {
        let p = part("P");
        let wo = WorkOrderId::new();
        let mut view = view_with(&p, 10);

        view.reserve(wo, &p, Quantity::from(5)).unwrap();

        assert_eq!(view.stock(&p).unwrap().reserved(), Quantity::from(5));
        assert_eq!(view.held(wo, &p), Quantity::from(5));
        assert_eq!(view.available(&p), Quantity::from(5));
    }

    #[test]
    fn release_cannot_touch_another_orders_claim() {
        let p = part("P");
        let a = WorkOrderId::new();
        let b = WorkOrderId::new();
        let mut view = view_with(&p, 10);
        view.reserve(a, &p, Quantity::from(6)).unwrap();

        let err = view.release(b, &p, Quantity::from(1)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(view.held(a, &p), Quantity::from(6));
    }

    #[test]
    fn consume_ledgers_an_issue_and_tombstones_the_claim() {
        let p = part("P");
        let wo = WorkOrderId::new();
        let mut view = view_with(&p, 10);
        view.reserve(wo, &p, Quantity::from(5)).unwrap();

        view.consume(wo, &p, Quantity::from(5), "WO-1").unwrap();
        let changes = view.into_changes();

        assert_eq!(changes.stock[0].on_hand(), Quantity::from(5));
        assert_eq!(changes.stock[0].reserved(), Quantity::ZERO);
        assert!(changes.reservations[0].is_released());
        assert_eq!(changes.transactions.len(), 1);
        assert_eq!(changes.transactions[0].kind, TransactionKind::Issue);
        assert_eq!(changes.transactions[0].delta, dec!(-5));
    }

    #[test]
    fn untouched_rows_are_not_reported_as_changes() {
        let p = part("P");
        let view = view_with(&p, 10);
        assert!(view.into_changes().is_empty());
    }

    #[test]
    fn unknown_parts_are_created_on_first_movement() {
        let p = part("NEW-PART");
        let mut view = LedgerView::new(Utc::now());
        view.receive(&p, Quantity::from(3), "PO-7").unwrap();
        let changes = view.into_changes();
        assert_eq!(changes.stock[0].on_hand(), Quantity::from(3));
        assert_eq!(changes.transactions[0].kind, TransactionKind::Receive);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(usize, u32),
        Release(usize, u32),
        Consume(usize, u32),
        Adjust(i32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 0u32..20).prop_map(|(w, q)| Op::Reserve(w, q)),
            (0usize..3, 0u32..20).prop_map(|(w, q)| Op::Release(w, q)),
            (0usize..3, 0u32..20).prop_map(|(w, q)| Op::Consume(w, q)),
            (-20i32..40).prop_map(Op::Adjust),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of ledger operations is attempted (failed
        /// ones included), `0 <= reserved <= on_hand` and the aggregate reserved
        /// counter equals the sum of the per-order claims.
        #[test]
        fn reserved_never_exceeds_on_hand(start in 0u32..50, ops in prop::collection::vec(op(), 1..40)) {
            let p = part("P");
            let orders = [WorkOrderId::new(), WorkOrderId::new(), WorkOrderId::new()];
            let mut view = view_with(&p, start);

            for op in ops {
                let _ = match op {
                    Op::Reserve(w, q) => view.reserve(orders[w], &p, Quantity::from(q)),
                    Op::Release(w, q) => view.release(orders[w], &p, Quantity::from(q)),
                    Op::Consume(w, q) => view.consume(orders[w], &p, Quantity::from(q), "prop"),
                    Op::Adjust(d) if d != 0 => view.apply_movement(
                        &p,
                        StockMovement::new(TransactionKind::Adjust, Decimal::from(d)).unwrap(),
                        "prop",
                    ),
                    Op::Adjust(_) => Ok(()),
                };

                let stock = view.stock(&p).unwrap();
                prop_assert!(stock.reserved() <= stock.on_hand());
                let claims = orders
                    .iter()
                    .fold(Quantity::ZERO, |acc, wo| acc.checked_add(view.held(*wo, &p)).unwrap());
                prop_assert_eq!(claims, stock.reserved());
            }
        }
    }
}
