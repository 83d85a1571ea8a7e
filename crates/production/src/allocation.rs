//! Kitting: reserve component stock for a work order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use forgemrp_core::{DomainError, DomainResult, PartKey, Quantity, WorkOrderId};
use forgemrp_inventory::LedgerView;

use crate::bom::Requirement;
use crate::work_order::WorkOrder;

/// Per-line (and overall) kitting status. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Kitted,
    Partial,
    Shortage,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Kitted => "kitted",
            LineStatus::Partial => "partial",
            LineStatus::Shortage => "shortage",
        }
    }

    fn for_line(required: Quantity, kitted: Quantity) -> Self {
        if kitted >= required {
            LineStatus::Kitted
        } else if kitted.is_zero() {
            LineStatus::Shortage
        } else {
            LineStatus::Partial
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitLine {
    pub component: PartKey,
    pub required: Quantity,
    /// Total now held by the order for this component.
    pub kitted: Quantity,
    /// Reserved by this kitting call.
    pub reserved_now: Quantity,
    /// Available stock before this call reserved anything.
    pub available_before: Quantity,
    pub shortfall: Quantity,
    pub status: LineStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitReport {
    pub work_order_id: WorkOrderId,
    pub status: LineStatus,
    pub lines: Vec<KitLine>,
}

impl KitReport {
    pub fn is_fully_kitted(&self) -> bool {
        self.status == LineStatus::Kitted
    }

    pub fn reserved_any(&self) -> bool {
        self.lines.iter().any(|l| !l.reserved_now.is_zero())
    }
}

/// Reserve what is available towards each requirement, topping up what the
/// order already holds. Lines are processed in the order given (callers pass
/// them sorted by component key).
///
/// Shortages are reported, not errors. Repeating the call reserves only
/// stock that became available since the last one.
pub fn kit(
    order: &WorkOrder,
    requirements: &[Requirement],
    ledger: &mut LedgerView,
) -> DomainResult<KitReport> {
    if !order.status().is_allocatable() {
        return Err(DomainError::conflict(format!(
            "work order {} is {} and cannot be kitted",
            order.id_typed(),
            order.status()
        )));
    }

    let wo = order.id_typed();
    let mut lines = Vec::with_capacity(requirements.len());

    for req in requirements {
        let held = ledger.held(wo, &req.component);
        let available_before = ledger.available(&req.component);
        let outstanding = req.required.saturating_sub(held);
        let reserved_now = outstanding.min(available_before);

        ledger.reserve(wo, &req.component, reserved_now)?;

        let kitted = held.checked_add(reserved_now)?;
        let shortfall = req.required.saturating_sub(kitted);
        let status = LineStatus::for_line(req.required, kitted);
        debug!(
            work_order = %wo,
            component = %req.component,
            required = %req.required,
            reserved_now = %reserved_now,
            shortfall = %shortfall,
            "kit line"
        );

        lines.push(KitLine {
            component: req.component.clone(),
            required: req.required,
            kitted,
            reserved_now,
            available_before,
            shortfall,
            status,
        });
    }

    let status = lines
        .iter()
        .map(|l| l.status)
        .max()
        .unwrap_or(LineStatus::Kitted);

    Ok(KitReport {
        work_order_id: wo,
        status,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_order::{NewWorkOrder, Priority, WorkOrderPatch, WorkOrderStatus};
    use chrono::Utc;
    use forgemrp_inventory::StockItem;
    use proptest::prelude::*;

    fn part(s: &str) -> PartKey {
        PartKey::parse(s).unwrap()
    }

    fn test_order(qty: u32) -> WorkOrder {
        WorkOrder::create(
            WorkOrderId::new(),
            NewWorkOrder {
                assembly: part("PCA-MAIN-V1.0"),
                quantity: Quantity::from(qty),
                priority: Priority::Normal,
                due_date: None,
                notes: None,
                status: None,
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

    fn req(component: &str, required: u32) -> Requirement {
        Requirement {
            component: part(component),
            required: Quantity::from(required),
        }
    }

    #[test]
    fn full_stock_kits_every_line() {
        let order = test_order(10);
        let mut ledger = test_ledger(&[("RES-10K", 100), ("CAP-1U", 50)]);

        let report = kit(&order, &[req("CAP-1U", 20), req("RES-10K", 40)], &mut ledger).unwrap();

        assert_eq!(report.status, LineStatus::Kitted);
        assert_eq!(ledger.stock(&part("RES-10K")).unwrap().reserved(), Quantity::from(40));
        assert_eq!(ledger.stock(&part("CAP-1U")).unwrap().reserved(), Quantity::from(20));
    }

    #[test]
    fn partial_stock_reserves_what_is_there() {
        let order = test_order(10);
        let mut ledger = test_ledger(&[("RES-10K", 15)]);

        let report = kit(&order, &[req("RES-10K", 40)], &mut ledger).unwrap();
        let line = &report.lines[0];

        assert_eq!(line.status, LineStatus::Partial);
        assert_eq!(line.reserved_now, Quantity::from(15));
        assert_eq!(line.shortfall, Quantity::from(25));
        assert_eq!(report.status, LineStatus::Partial);
    }

    #[test]
    fn missing_component_is_a_shortage_not_an_error() {
        let order = test_order(1);
        let mut ledger = test_ledger(&[("RES-10K", 10)]);

        let report = kit(&order, &[req("IC-MCU", 1), req("RES-10K", 4)], &mut ledger).unwrap();

        assert_eq!(report.lines[0].status, LineStatus::Shortage);
        assert_eq!(report.lines[1].status, LineStatus::Kitted);
        assert_eq!(report.status, LineStatus::Shortage);
    }

    #[test]
    fn rekitting_only_tops_up_the_outstanding_amount() {
        let order = test_order(10);
        let mut ledger = test_ledger(&[("RES-10K", 15)]);
        kit(&order, &[req("RES-10K", 40)], &mut ledger).unwrap();

        // Nothing new arrived: second call reserves nothing.
        let again = kit(&order, &[req("RES-10K", 40)], &mut ledger).unwrap();
        assert_eq!(again.lines[0].reserved_now, Quantity::ZERO);
        assert_eq!(again.lines[0].kitted, Quantity::from(15));

        ledger.receive(&part("RES-10K"), Quantity::from(100), "PO-1").unwrap();
        let topped = kit(&order, &[req("RES-10K", 40)], &mut ledger).unwrap();
        assert_eq!(topped.lines[0].reserved_now, Quantity::from(25));
        assert_eq!(topped.status, LineStatus::Kitted);
        assert_eq!(ledger.held(order.id_typed(), &part("RES-10K")), Quantity::from(40));
    }

    #[test]
    fn assembly_without_bom_is_trivially_kitted() {
        let order = test_order(3);
        let mut ledger = test_ledger(&[]);
        let report = kit(&order, &[], &mut ledger).unwrap();
        assert_eq!(report.status, LineStatus::Kitted);
        assert!(report.lines.is_empty());
    }

    #[test]
    fn non_allocatable_orders_are_rejected() {
        let mut order = test_order(1);
        let mut ledger = test_ledger(&[("P", 5)]);
        order
            .apply_update(&WorkOrderPatch::status(WorkOrderStatus::Open), &mut ledger)
            .unwrap();
        order
            .apply_update(&WorkOrderPatch::status(WorkOrderStatus::OnHold), &mut ledger)
            .unwrap();

        match kit(&order, &[req("P", 1)], &mut ledger) {
            Err(DomainError::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(ledger.stock(&part("P")).unwrap().reserved(), Quantity::ZERO);
    }

    #[test]
    fn competing_orders_never_oversubscribe() {
        let first = test_order(1);
        let second = test_order(1);
        let mut ledger = test_ledger(&[("P", 10)]);

        let a = kit(&first, &[req("P", 8)], &mut ledger).unwrap();
        let b = kit(&second, &[req("P", 8)], &mut ledger).unwrap();

        assert_eq!(a.lines[0].reserved_now, Quantity::from(8));
        assert_eq!(b.lines[0].reserved_now, Quantity::from(2));
        assert_eq!(b.lines[0].available_before, Quantity::from(2));
        let stock = ledger.stock(&part("P")).unwrap();
        assert_eq!(stock.reserved(), Quantity::from(10));
        assert_eq!(stock.available(), Quantity::ZERO);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: reserved_now never exceeds what was available, and the
        /// line total never exceeds the requirement.
        #[test]
        fn kitting_is_bounded_by_stock_and_requirement(
            on_hand in 0u32..200,
            required in 1u32..200,
            rounds in 1usize..4,
        ) {
            let order = test_order(1);
            let mut ledger = test_ledger(&[("P", on_hand)]);

            for _ in 0..rounds {
                let report = kit(&order, &[req("P", required)], &mut ledger).unwrap();
                let line = &report.lines[0];
                prop_assert!(line.reserved_now <= line.available_before);
                prop_assert!(line.kitted <= line.required);
                prop_assert_eq!(line.kitted.checked_add(line.shortfall).unwrap(), line.required);
            }

            let stock = ledger.stock(&part("P")).unwrap();
            prop_assert!(stock.reserved() <= stock.on_hand());
            prop_assert_eq!(stock.reserved(), Quantity::from(on_hand.min(required)));
        }
    }
}
