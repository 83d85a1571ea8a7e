//! Exact, non-negative unit quantities.
//!
//! Quantities are real-valued (a BOM may call for 0.25 m of cable per unit),
//! so they are backed by `rust_decimal::Decimal` rather than floats: kitting
//! compares "reserved == required" exactly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A non-negative physical quantity.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Build a quantity, rejecting negative values.
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!(
                "quantity cannot be negative (got {value})"
            )));
        }
        Ok(Self(value.normalize()))
    }

    /// Build a strictly positive quantity; `what` names the field in the error.
    pub fn positive(value: Decimal, what: &str) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "{what} must be greater than zero (got {value})"
            )));
        }
        Self::new(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `self + other`; fails rather than overflowing the decimal range.
    pub fn checked_add(self, other: Quantity) -> DomainResult<Quantity> {
        self.0
            .checked_add(other.0)
            .map(|v| Quantity(v.normalize()))
            .ok_or_else(|| DomainError::validation("quantity overflow"))
    }

    /// `self - other`, or `None` when the result would be negative.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        if other.0 > self.0 {
            None
        } else {
            Some(Quantity((self.0 - other.0).normalize()))
        }
    }

    /// `self - other`, floored at zero.
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        self.checked_sub(other).unwrap_or(Quantity::ZERO)
    }

    /// Multiply by a per-unit factor (`build qty × qty_per`).
    pub fn scaled(self, factor: Quantity) -> DomainResult<Quantity> {
        self.0
            .checked_mul(factor.0)
            .map(|v| Quantity(v.normalize()))
            .ok_or_else(|| DomainError::validation("quantity overflow"))
    }
}

impl From<u32> for Quantity {
    fn from(value: u32) -> Self {
        Quantity(Decimal::from(value))
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_quantities_are_rejected() {
        assert!(Quantity::new(dec!(-0.5)).is_err());
        assert!(Quantity::new(dec!(0)).is_ok());
        assert!(Quantity::positive(dec!(0), "qty").is_err());
    }

    #[test]
    fn subtraction_never_goes_negative() {
        let ten = Quantity::from(10);
        let three = Quantity::from(3);
        assert_eq!(ten.checked_sub(three), Some(Quantity::from(7)));
        assert_eq!(three.checked_sub(ten), None);
        assert_eq!(three.saturating_sub(ten), Quantity::ZERO);
    }

    #[test]
    fn addition_reports_overflow() {
        let half = Quantity::new(dec!(50000000000000000000000000000)).unwrap();
        assert_eq!(Quantity::from(2).checked_add(Quantity::from(3)).unwrap(), Quantity::from(5));
        assert!(matches!(half.checked_add(half), Err(DomainError::Validation(_))));
    }

    #[test]
    fn equality_ignores_scale() {
        let a = Quantity::new(dec!(5.000)).unwrap();
        assert_eq!(a, Quantity::from(5));
        let q = Quantity::from(4).scaled(Quantity::new(dec!(0.25)).unwrap()).unwrap();
        assert_eq!(q, Quantity::from(1));
    }

    #[test]
    fn json_numbers_deserialize() {
        let q: Quantity = serde_json::from_str("2.5").unwrap();
        assert_eq!(q.value(), dec!(2.5));
        assert!(serde_json::from_str::<Quantity>("-1").is_err());
    }
}
