use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use forgemrp_core::{DomainError, DomainResult, Entity, PartKey, Quantity};

/// On-hand and reserved quantity for one stock-keeping unit.
///
/// Invariant: `reserved <= on_hand`. The mutators are crate-private; outside
/// this crate stock changes only through [`crate::LedgerView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    part: PartKey,
    on_hand: Quantity,
    reserved: Quantity,
    reorder_point: Option<Quantity>,
    reorder_qty: Option<Quantity>,
    updated_at: DateTime<Utc>,
}

impl StockItem {
    /// A zeroed stock record, as created implicitly on first reference.
    pub fn new(part: PartKey, now: DateTime<Utc>) -> Self {
        Self {
            part,
            on_hand: Quantity::ZERO,
            reserved: Quantity::ZERO,
            reorder_point: None,
            reorder_qty: None,
            updated_at: now,
        }
    }

    /// Rebuild a stock record from persisted columns, re-checking the invariant.
    pub fn restore(
        part: PartKey,
        on_hand: Quantity,
        reserved: Quantity,
        reorder_point: Option<Quantity>,
        reorder_qty: Option<Quantity>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if reserved > on_hand {
            return Err(DomainError::invariant(format!(
                "stored stock for {part} has reserved {reserved} > on hand {on_hand}"
            )));
        }
        Ok(Self {
            part,
            on_hand,
            reserved,
            reorder_point,
            reorder_qty,
            updated_at,
        })
    }

    pub fn part(&self) -> &PartKey {
        &self.part
    }

    pub fn on_hand(&self) -> Quantity {
        self.on_hand
    }

    pub fn reserved(&self) -> Quantity {
        self.reserved
    }

    /// `on_hand - reserved`, floored at zero.
    pub fn available(&self) -> Quantity {
        self.on_hand.saturating_sub(self.reserved)
    }

    pub fn reorder_point(&self) -> Option<Quantity> {
        self.reorder_point
    }

    pub fn reorder_qty(&self) -> Option<Quantity> {
        self.reorder_qty
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True when a reorder point is set and available stock has fallen below it.
    pub fn needs_reorder(&self) -> bool {
        self.reorder_point
            .is_some_and(|point| self.available() < point)
    }

    pub(crate) fn set_reorder(
        &mut self,
        point: Option<Quantity>,
        qty: Option<Quantity>,
        now: DateTime<Utc>,
    ) {
        self.reorder_point = point;
        self.reorder_qty = qty;
        self.updated_at = now;
    }

    pub(crate) fn reserve(&mut self, qty: Quantity, now: DateTime<Utc>) -> DomainResult<()> {
        let reserved = self.reserved.checked_add(qty)?;
        if reserved > self.on_hand {
            return Err(DomainError::invariant(format!(
                "cannot reserve {qty} of {}: only {} available",
                self.part,
                self.available()
            )));
        }
        self.reserved = reserved;
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn release(&mut self, qty: Quantity, now: DateTime<Utc>) -> DomainResult<()> {
        self.reserved = self.reserved.checked_sub(qty).ok_or_else(|| {
            DomainError::invariant(format!(
                "cannot release {qty} of {}: only {} reserved",
                self.part, self.reserved
            ))
        })?;
        self.updated_at = now;
        Ok(())
    }

    /// Retire a reservation into real consumption: both counters drop by `qty`.
    pub(crate) fn consume(&mut self, qty: Quantity, now: DateTime<Utc>) -> DomainResult<()> {
        let reserved = self.reserved.checked_sub(qty).ok_or_else(|| {
            DomainError::invariant(format!(
                "cannot consume {qty} of {}: only {} reserved",
                self.part, self.reserved
            ))
        })?;
        // reserved <= on_hand, so on_hand >= qty here.
        let on_hand = self.on_hand.checked_sub(qty).ok_or_else(|| {
            DomainError::invariant(format!("cannot consume {qty} of {}: on hand too low", self.part))
        })?;
        self.reserved = reserved;
        self.on_hand = on_hand;
        self.updated_at = now;
        Ok(())
    }

    /// Apply a signed on-hand delta (receipt, scrap, count adjustment).
    ///
    /// Unreserved stock is the only stock that may leave: on hand can never
    /// drop below what is currently reserved.
    pub(crate) fn adjust(&mut self, delta: Decimal, now: DateTime<Utc>) -> DomainResult<()> {
        let next = self
            .on_hand
            .value()
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        if next < self.reserved.value() {
            return Err(DomainError::invariant(format!(
                "adjusting {} by {delta} would leave on hand {next} below reserved {}",
                self.part, self.reserved
            )));
        }
        self.on_hand = Quantity::new(next)?;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for StockItem {
    type Id = PartKey;

    fn id(&self) -> &Self::Id {
        &self.part
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(on_hand: u32, reserved: u32) -> StockItem {
        StockItem::restore(
            PartKey::parse("RES-10K").unwrap(),
            Quantity::from(on_hand),
            Quantity::from(reserved),
            None,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn restore_rejects_over_reserved_rows() {
        let err = StockItem::restore(
            PartKey::parse("X").unwrap(),
            Quantity::from(1),
            Quantity::from(2),
            None,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn reserve_cannot_exceed_on_hand() {
        let mut s = item(10, 5);
        s.reserve(Quantity::from(5), Utc::now()).unwrap();
        assert_eq!(s.available(), Quantity::ZERO);
        assert!(s.reserve(Quantity::from(1), Utc::now()).is_err());
        assert_eq!(s.reserved(), Quantity::from(10));
    }

    #[test]
    fn consume_drops_both_counters() {
        let mut s = item(10, 5);
        s.consume(Quantity::from(5), Utc::now()).unwrap();
        assert_eq!(s.on_hand(), Quantity::from(5));
        assert_eq!(s.reserved(), Quantity::ZERO);
    }

    #[test]
    fn adjust_cannot_eat_into_reserved_stock() {
        let mut s = item(10, 7);
        assert!(s.adjust(dec!(-4), Utc::now()).is_err());
        s.adjust(dec!(-3), Utc::now()).unwrap();
        assert_eq!(s.on_hand(), Quantity::from(7));
    }

    #[test]
    fn reorder_point_compares_against_available() {
        let mut s = item(10, 6);
        assert!(!s.needs_reorder());
        s.set_reorder(Some(Quantity::from(5)), Some(Quantity::from(50)), Utc::now());
        assert!(s.needs_reorder());
    }

    #[test]
    fn sitting_exactly_at_the_reorder_point_is_not_below_it() {
        let mut s = item(10, 6);
        s.set_reorder(Some(Quantity::from(4)), None, Utc::now());
        assert!(!s.needs_reorder());
        s.reserve(Quantity::from(1), Utc::now()).unwrap();
        assert!(s.needs_reorder());
    }
}
