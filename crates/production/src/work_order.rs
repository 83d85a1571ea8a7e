//! Work order aggregate and its status state machine.

use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use forgemrp_core::{DomainError, DomainResult, Entity, PartKey, Quantity, WorkOrderId};
use forgemrp_inventory::LedgerView;

use crate::settlement::{SettlementReport, settle_cancellation, settle_completion};

/// Work order status lifecycle.
///
/// ```text
/// draft ──> open ──> in_progress ──> completed
///   │        │            │
///   │        ├──> on_hold <┘
///   v        v
/// cancelled <┘
/// ```
///
/// Nothing leaves `on_hold`; a held order can only be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Draft,
    Open,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Draft => "draft",
            WorkOrderStatus::Open => "open",
            WorkOrderStatus::InProgress => "in_progress",
            WorkOrderStatus::OnHold => "on_hold",
            WorkOrderStatus::Completed => "completed",
            WorkOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Cancelled)
    }

    /// Statuses in which kitting may reserve stock.
    pub fn is_allocatable(&self) -> bool {
        matches!(
            self,
            WorkOrderStatus::Draft | WorkOrderStatus::Open | WorkOrderStatus::InProgress
        )
    }

    /// Pure transition table; depends on nothing but the two statuses.
    pub fn can_transition(self, to: WorkOrderStatus) -> bool {
        use WorkOrderStatus::*;
        matches!(
            (self, to),
            (Draft, Open)
                | (Draft, Cancelled)
                | (Open, InProgress)
                | (Open, OnHold)
                | (Open, Cancelled)
                | (InProgress, Completed)
                | (InProgress, OnHold)
        )
    }
}

impl core::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(WorkOrderStatus::Draft),
            "open" => Ok(WorkOrderStatus::Open),
            "in_progress" => Ok(WorkOrderStatus::InProgress),
            "on_hold" => Ok(WorkOrderStatus::OnHold),
            "completed" => Ok(WorkOrderStatus::Completed),
            "cancelled" => Ok(WorkOrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "status must be one of: draft, open, in_progress, on_hold, completed, cancelled (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(DomainError::validation(format!(
                "priority must be one of: low, normal, high, urgent (got '{other}')"
            ))),
        }
    }
}

/// Input for creating a work order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkOrder {
    pub assembly: PartKey,
    pub quantity: Quantity,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Initial status; only `draft` (default) or `open` are accepted.
    pub status: Option<WorkOrderStatus>,
}

/// Requested changes to a work order. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkOrderPatch {
    pub status: Option<WorkOrderStatus>,
    pub qty_good: Option<Quantity>,
    pub qty_scrap: Option<Quantity>,
    pub priority: Option<Priority>,
    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<NaiveDate>>,
    pub notes: Option<String>,
}

impl WorkOrderPatch {
    pub fn status(status: WorkOrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Result of [`WorkOrder::apply_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub previous_status: WorkOrderStatus,
    /// `Some` only when the status actually changed.
    pub transition: Option<WorkOrderStatus>,
    pub settlement: Option<SettlementReport>,
}

/// Aggregate root: WorkOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    id: WorkOrderId,
    assembly: PartKey,
    quantity: Quantity,
    qty_good: Quantity,
    qty_scrap: Quantity,
    status: WorkOrderStatus,
    priority: Priority,
    due_date: Option<NaiveDate>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl WorkOrder {
    pub fn create(id: WorkOrderId, new: NewWorkOrder, now: DateTime<Utc>) -> DomainResult<Self> {
        if new.quantity.is_zero() {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        let status = new.status.unwrap_or(WorkOrderStatus::Draft);
        if !matches!(status, WorkOrderStatus::Draft | WorkOrderStatus::Open) {
            return Err(DomainError::validation(format!(
                "work orders start as draft or open, not {status}"
            )));
        }
        Ok(Self {
            id,
            assembly: new.assembly,
            quantity: new.quantity,
            qty_good: Quantity::ZERO,
            qty_scrap: Quantity::ZERO,
            status,
            priority: new.priority,
            due_date: new.due_date,
            notes: normalize_notes(new.notes),
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        })
    }

    /// Rebuild from persisted columns (stores only).
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: WorkOrderId,
        assembly: PartKey,
        quantity: Quantity,
        qty_good: Quantity,
        qty_scrap: Quantity,
        status: WorkOrderStatus,
        priority: Priority,
        due_date: Option<NaiveDate>,
        notes: Option<String>,
        created_at: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            assembly,
            quantity,
            qty_good,
            qty_scrap,
            status,
            priority,
            due_date,
            notes,
            created_at,
            started_at,
            completed_at,
            updated_at,
        }
    }

    pub fn id_typed(&self) -> WorkOrderId {
        self.id
    }

    pub fn assembly(&self) -> &PartKey {
        &self.assembly
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn qty_good(&self) -> Quantity {
        self.qty_good
    }

    pub fn qty_scrap(&self) -> Quantity {
        self.qty_scrap
    }

    pub fn status(&self) -> WorkOrderStatus {
        self.status
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Finished-goods quantity credited on completion: the declared good
    /// quantity if any, otherwise the ordered quantity.
    pub fn produced_quantity(&self) -> Quantity {
        if self.qty_good.is_zero() {
            self.quantity
        } else {
            self.qty_good
        }
    }

    /// Validate and apply a patch, running settlement on the ledger when the
    /// order moves to `completed` or `cancelled`.
    ///
    /// `self` is only modified once every check and the settlement have
    /// succeeded, so an `Err` leaves the order exactly as it was. The ledger
    /// view may be partially modified on `Err`; callers discard it.
    pub fn apply_update(
        &mut self,
        patch: &WorkOrderPatch,
        ledger: &mut LedgerView,
    ) -> DomainResult<UpdateOutcome> {
        let now = ledger.now();
        let previous_status = self.status;

        if self.status.is_terminal() {
            return Err(DomainError::conflict(format!(
                "work order {} is {} and can no longer change",
                self.id, self.status
            )));
        }

        let transition = match patch.status {
            Some(to) if to != self.status => {
                if !self.status.can_transition(to) {
                    return Err(DomainError::conflict(format!(
                        "invalid status transition {} -> {}",
                        self.status, to
                    )));
                }
                Some(to)
            }
            _ => None,
        };

        let mut next = self.clone();
        if let Some(good) = patch.qty_good {
            next.qty_good = good;
        }
        if let Some(scrap) = patch.qty_scrap {
            next.qty_scrap = scrap;
        }
        if next.qty_good.checked_add(next.qty_scrap)? > next.quantity {
            return Err(DomainError::validation(format!(
                "good ({}) + scrap ({}) exceeds ordered quantity {}",
                next.qty_good, next.qty_scrap, next.quantity
            )));
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        if let Some(due) = patch.due_date {
            next.due_date = due;
        }
        if patch.notes.is_some() {
            next.notes = normalize_notes(patch.notes.clone());
        }

        let settlement = match transition {
            Some(WorkOrderStatus::Completed) => {
                Some(settle_completion(&next, next.produced_quantity(), ledger)?)
            }
            Some(WorkOrderStatus::Cancelled) => Some(settle_cancellation(next.id, ledger)?),
            _ => None,
        };

        if let Some(to) = transition {
            next.status = to;
            match to {
                WorkOrderStatus::InProgress if next.started_at.is_none() => {
                    next.started_at = Some(now);
                }
                WorkOrderStatus::Completed => next.completed_at = Some(now),
                _ => {}
            }
        }
        next.updated_at = now;

        *self = next;
        Ok(UpdateOutcome {
            previous_status,
            transition,
            settlement,
        })
    }
}

impl Entity for WorkOrder {
    type Id = WorkOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgemrp_inventory::StockItem;
    use WorkOrderStatus::*;

    const ALL: [WorkOrderStatus; 6] = [Draft, Open, InProgress, OnHold, Completed, Cancelled];

    fn part(s: &str) -> PartKey {
        PartKey::parse(s).unwrap()
    }

    fn new_order(qty: u32) -> WorkOrder {
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

    fn move_to(order: &mut WorkOrder, to: WorkOrderStatus, ledger: &mut LedgerView) -> DomainResult<UpdateOutcome> {
        order.apply_update(&WorkOrderPatch::status(to), ledger)
    }

    #[test]
    fn documented_transitions_are_allowed() {
        for (from, to) in [
            (Draft, Open),
            (Draft, Cancelled),
            (Open, InProgress),
            (Open, OnHold),
            (Open, Cancelled),
            (InProgress, Completed),
            (InProgress, OnHold),
        ] {
            assert!(from.can_transition(to), "{from} -> {to} should be allowed");
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL {
            assert!(!Completed.can_transition(to));
            assert!(!Cancelled.can_transition(to));
        }
    }

    #[test]
    fn held_orders_cannot_resume_or_cancel() {
        for to in [Draft, Open, InProgress, Completed, Cancelled] {
            assert!(!OnHold.can_transition(to), "on_hold -> {to} should be rejected");
        }
    }

    #[test]
    fn only_listed_transitions_are_allowed() {
        let allowed = [
            (Draft, Open),
            (Draft, Cancelled),
            (Open, InProgress),
            (Open, OnHold),
            (Open, Cancelled),
            (InProgress, Completed),
            (InProgress, OnHold),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(from.can_transition(to), allowed.contains(&(from, to)), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn skipping_steps_is_rejected() {
        assert!(!Draft.can_transition(InProgress));
        assert!(!Draft.can_transition(Completed));
        assert!(!Open.can_transition(Completed));
        assert!(!InProgress.can_transition(Cancelled));
        assert!(!InProgress.can_transition(Open));
    }

    #[test]
    fn new_orders_start_in_draft_and_reject_zero_quantity() {
        assert_eq!(new_order(3).status(), Draft);

        let err = WorkOrder::create(
            WorkOrderId::new(),
            NewWorkOrder {
                assembly: part("A"),
                quantity: Quantity::ZERO,
                priority: Priority::Low,
                due_date: None,
                notes: None,
                status: None,
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn first_start_is_stamped_once() {
        let mut order = new_order(1);
        let mut ledger = LedgerView::new(Utc::now());
        move_to(&mut order, Open, &mut ledger).unwrap();
        move_to(&mut order, InProgress, &mut ledger).unwrap();
        let started = order.started_at().unwrap();

        let mut later = LedgerView::new(started + chrono::Duration::hours(1));
        let outcome = move_to(&mut order, InProgress, &mut later).unwrap();
        assert_eq!(outcome.transition, None);
        move_to(&mut order, OnHold, &mut later).unwrap();

        assert_eq!(order.started_at(), Some(started));
        assert!(matches!(move_to(&mut order, InProgress, &mut later), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn invalid_transition_leaves_order_untouched() {
        let mut order = new_order(1);
        let mut ledger = LedgerView::new(Utc::now());
        let before = order.clone();

        let err = move_to(&mut order, Completed, &mut ledger).unwrap_err();

        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(order, before);
    }

    #[test]
    fn terminal_orders_reject_any_update() {
        let mut order = new_order(1);
        let mut ledger = LedgerView::new(Utc::now());
        move_to(&mut order, Cancelled, &mut ledger).unwrap();

        let patch = WorkOrderPatch {
            notes: Some("late note".to_string()),
            ..WorkOrderPatch::default()
        };
        assert!(matches!(order.apply_update(&patch, &mut ledger), Err(DomainError::Conflict(_))));
        assert!(matches!(move_to(&mut order, Open, &mut ledger), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn good_plus_scrap_cannot_exceed_ordered() {
        let mut order = new_order(5);
        let mut ledger = LedgerView::new(Utc::now());
        let patch = WorkOrderPatch {
            qty_good: Some(Quantity::from(4)),
            qty_scrap: Some(Quantity::from(2)),
            ..WorkOrderPatch::default()
        };
        assert!(matches!(order.apply_update(&patch, &mut ledger), Err(DomainError::Validation(_))));
        assert_eq!(order.qty_good(), Quantity::ZERO);
    }

    #[test]
    fn completion_credits_declared_good_quantity() {
        let mut order = new_order(5);
        let mut ledger = LedgerView::new(Utc::now());
        ledger.load_stock(StockItem::new(order.assembly().clone(), Utc::now()));
        move_to(&mut order, Open, &mut ledger).unwrap();
        move_to(&mut order, InProgress, &mut ledger).unwrap();

        let patch = WorkOrderPatch {
            status: Some(Completed),
            qty_good: Some(Quantity::from(4)),
            qty_scrap: Some(Quantity::from(1)),
            ..WorkOrderPatch::default()
        };
        let outcome = order.apply_update(&patch, &mut ledger).unwrap();

        assert_eq!(outcome.transition, Some(Completed));
        assert!(order.completed_at().is_some());
        assert_eq!(
            ledger.stock(order.assembly()).unwrap().on_hand(),
            Quantity::from(4)
        );
    }

    #[test]
    fn due_date_can_be_set_and_cleared() {
        let mut order = new_order(2);
        let mut ledger = LedgerView::new(Utc::now());
        let due = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();

        let set = WorkOrderPatch {
            due_date: Some(Some(due)),
            ..WorkOrderPatch::default()
        };
        order.apply_update(&set, &mut ledger).unwrap();
        assert_eq!(order.due_date(), Some(due));

        order.apply_update(&WorkOrderPatch::default(), &mut ledger).unwrap();
        assert_eq!(order.due_date(), Some(due));

        let clear = WorkOrderPatch {
            due_date: Some(None),
            ..WorkOrderPatch::default()
        };
        order.apply_update(&clear, &mut ledger).unwrap();
        assert_eq!(order.due_date(), None);
    }

    #[test]
    fn same_status_is_a_plain_field_update() {
        let mut order = new_order(2);
        let mut ledger = LedgerView::new(Utc::now());
        let patch = WorkOrderPatch {
            status: Some(Draft),
            priority: Some(Priority::Urgent),
            ..WorkOrderPatch::default()
        };
        let outcome = order.apply_update(&patch, &mut ledger).unwrap();
        assert_eq!(outcome.transition, None);
        assert_eq!(order.priority(), Priority::Urgent);
    }
}
