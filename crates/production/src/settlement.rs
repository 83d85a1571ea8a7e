//! Settling a work order's reservations when it reaches a terminal state.

use serde::{Deserialize, Serialize};

use forgemrp_core::{DomainResult, PartKey, Quantity, WorkOrderId};
use forgemrp_inventory::LedgerView;

use crate::work_order::WorkOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    /// Reservations consumed; finished goods credited.
    Consumed,
    /// Reservations returned to the available pool.
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledLine {
    pub component: PartKey,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub work_order_id: WorkOrderId,
    pub kind: SettlementKind,
    pub lines: Vec<SettledLine>,
    /// Finished goods credited to the assembly (completion only).
    pub produced: Option<Quantity>,
}

/// Consume every reservation the order holds and credit `produced` units of
/// the assembly.
///
/// Consumption follows what was actually reserved, not the BOM, so a short
/// kit consumes only what it held and the order's rows end at zero.
pub fn settle_completion(
    order: &WorkOrder,
    produced: Quantity,
    ledger: &mut LedgerView,
) -> DomainResult<SettlementReport> {
    let wo = order.id_typed();
    let reference = wo.reference();
    let mut lines = Vec::new();

    for reservation in ledger.reservations_for(wo) {
        ledger.consume(wo, &reservation.part, reservation.quantity, &reference)?;
        lines.push(SettledLine {
            component: reservation.part,
            quantity: reservation.quantity,
        });
    }

    ledger.receive(order.assembly(), produced, &reference)?;

    Ok(SettlementReport {
        work_order_id: wo,
        kind: SettlementKind::Consumed,
        lines,
        produced: Some(produced),
    })
}

/// Return every reservation the order holds to the pool. On hand is
/// untouched and no transactions are written.
pub fn settle_cancellation(
    work_order_id: WorkOrderId,
    ledger: &mut LedgerView,
) -> DomainResult<SettlementReport> {
    let mut lines = Vec::new();

    for reservation in ledger.reservations_for(work_order_id) {
        ledger.release(work_order_id, &reservation.part, reservation.quantity)?;
        lines.push(SettledLine {
            component: reservation.part,
            quantity: reservation.quantity,
        });
    }

    Ok(SettlementReport {
        work_order_id,
        kind: SettlementKind::Released,
        lines,
        produced: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::kit;
    use crate::bom::{BomLine, resolve_requirements};
    use crate::work_order::{NewWorkOrder, Priority, WorkOrderPatch, WorkOrderStatus};
    use chrono::Utc;
    use forgemrp_inventory::{StockItem, TransactionKind};
    use rust_decimal_macros::dec;

    fn part(s: &str) -> PartKey {
        PartKey::parse(s).unwrap()
    }

    fn test_order(qty: u32) -> WorkOrder {
        WorkOrder::create(
            WorkOrderId::new(),
            NewWorkOrder {
                assembly: part("PCA-MAIN-V1.0"),
                quantity: Quantity::from(qty),
                priority: Priority::High,
                due_date: None,
                notes: None,
                status: Some(WorkOrderStatus::Open),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn test_ledger(stock: &[(&str, u32)]) -> LedgerView {
        let mut ledger = LedgerView::new(Utc::now());
        for (p, on_hand) in stock {
            ledger.load_stock(
                StockItem::restore(part(p), Quantity::from(*on_hand), Quantity::ZERO, None, None, Utc::now())
                    .unwrap(),
            );
        }
        ledger
    }

    fn test_bom() -> Vec<BomLine> {
        vec![
            BomLine::new(part("PCA-MAIN-V1.0"), part("RES-10K"), Quantity::from(4)).unwrap(),
            BomLine::new(part("PCA-MAIN-V1.0"), part("CAP-1U"), Quantity::from(2)).unwrap(),
        ]
    }

    fn kit_order(order: &WorkOrder, ledger: &mut LedgerView) {
        let reqs = resolve_requirements(order.assembly(), &test_bom(), order.quantity()).unwrap();
        kit(order, &reqs, ledger).unwrap();
    }

    #[test]
    fn completion_consumes_reservations_and_credits_assembly() {
        let mut order = test_order(10);
        let mut ledger = test_ledger(&[("RES-10K", 100), ("CAP-1U", 50)]);
        kit_order(&order, &mut ledger);

        order.apply_update(&WorkOrderPatch::status(WorkOrderStatus::InProgress), &mut ledger).unwrap();
        let outcome = order
            .apply_update(&WorkOrderPatch::status(WorkOrderStatus::Completed), &mut ledger)
            .unwrap();

        let report = outcome.settlement.unwrap();
        assert_eq!(report.kind, SettlementKind::Consumed);
        assert_eq!(report.produced, Some(Quantity::from(10)));

        let res = ledger.stock(&part("RES-10K")).unwrap();
        assert_eq!(res.on_hand(), Quantity::from(60));
        assert_eq!(res.reserved(), Quantity::ZERO);
        let cap = ledger.stock(&part("CAP-1U")).unwrap();
        assert_eq!(cap.on_hand(), Quantity::from(30));
        assert_eq!(cap.reserved(), Quantity::ZERO);
        assert_eq!(
            ledger.stock(&part("PCA-MAIN-V1.0")).unwrap().on_hand(),
            Quantity::from(10)
        );

        let changes = ledger.into_changes();
        let issues: Vec<_> = changes
            .transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Issue)
            .collect();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|t| t.reference == order.id_typed().reference()));
        let receipts: Vec<_> = changes
            .transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Receive)
            .collect();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].delta, dec!(10));
    }

    #[test]
    fn cancellation_releases_without_touching_on_hand() {
        let mut order = test_order(10);
        let mut ledger = test_ledger(&[("RES-10K", 100), ("CAP-1U", 50)]);
        kit_order(&order, &mut ledger);

        let outcome = order
            .apply_update(&WorkOrderPatch::status(WorkOrderStatus::Cancelled), &mut ledger)
            .unwrap();

        assert_eq!(outcome.settlement.unwrap().kind, SettlementKind::Released);
        let res = ledger.stock(&part("RES-10K")).unwrap();
        assert_eq!(res.on_hand(), Quantity::from(100));
        assert_eq!(res.reserved(), Quantity::ZERO);
        assert_eq!(res.available(), Quantity::from(100));
        assert!(ledger.reservations_for(order.id_typed()).is_empty());
        assert!(ledger.into_changes().transactions.is_empty());
    }

    #[test]
    fn short_kit_consumes_only_what_was_held() {
        let mut order = test_order(10);
        let mut ledger = test_ledger(&[("RES-10K", 15), ("CAP-1U", 50)]);
        kit_order(&order, &mut ledger);

        order.apply_update(&WorkOrderPatch::status(WorkOrderStatus::InProgress), &mut ledger).unwrap();
        order
            .apply_update(&WorkOrderPatch::status(WorkOrderStatus::Completed), &mut ledger)
            .unwrap();

        let res = ledger.stock(&part("RES-10K")).unwrap();
        assert_eq!(res.on_hand(), Quantity::ZERO);
        assert_eq!(res.reserved(), Quantity::ZERO);
    }

    #[test]
    fn settlement_leaves_other_orders_claims_alone() {
        let mut first = test_order(5);
        let second = test_order(5);
        let mut ledger = test_ledger(&[("RES-10K", 100), ("CAP-1U", 50)]);
        kit_order(&first, &mut ledger);
        kit_order(&second, &mut ledger);

        first
            .apply_update(&WorkOrderPatch::status(WorkOrderStatus::Cancelled), &mut ledger)
            .unwrap();

        assert_eq!(ledger.held(second.id_typed(), &part("RES-10K")), Quantity::from(20));
        assert_eq!(
            ledger.stock(&part("RES-10K")).unwrap().reserved(),
            Quantity::from(20)
        );
    }

    #[test]
    fn cancelling_an_unkitted_order_is_a_no_op_settlement() {
        let order = test_order(1);
        let mut ledger = test_ledger(&[]);
        let report = settle_cancellation(order.id_typed(), &mut ledger).unwrap();
        assert!(report.lines.is_empty());
        assert!(ledger.into_changes().is_empty());
    }
}
