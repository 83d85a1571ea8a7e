use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forgemrp_core::{DomainError, DomainResult, PartKey};

/// Kind of on-hand movement recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Receive,
    Issue,
    Adjust,
    Return,
    Transfer,
    Scrap,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Receive => "receive",
            TransactionKind::Issue => "issue",
            TransactionKind::Adjust => "adjust",
            TransactionKind::Return => "return",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Scrap => "scrap",
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "receive" => Ok(TransactionKind::Receive),
            "issue" => Ok(TransactionKind::Issue),
            "adjust" => Ok(TransactionKind::Adjust),
            "return" => Ok(TransactionKind::Return),
            "transfer" => Ok(TransactionKind::Transfer),
            "scrap" => Ok(TransactionKind::Scrap),
            other => Err(DomainError::validation(format!(
                "kind must be one of: receive, issue, adjust, return, transfer, scrap (got '{other}')"
            ))),
        }
    }
}

/// Immutable record of one on-hand change. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: Uuid,
    pub part: PartKey,
    pub kind: TransactionKind,
    /// Signed change to on hand.
    pub delta: Decimal,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// An operator-requested stock movement, validated into a signed delta.
///
/// `receive`/`return` add stock and `issue`/`scrap` remove it (the quantity is
/// given as a positive magnitude); `adjust`/`transfer` take a signed quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    kind: TransactionKind,
    delta: Decimal,
}

impl StockMovement {
    pub fn new(kind: TransactionKind, quantity: Decimal) -> DomainResult<Self> {
        if quantity.is_zero() {
            return Err(DomainError::validation("quantity cannot be zero"));
        }
        let delta = match kind {
            TransactionKind::Receive | TransactionKind::Return => {
                if quantity.is_sign_negative() {
                    return Err(DomainError::validation(format!(
                        "{kind} quantity must be positive"
                    )));
                }
                quantity
            }
            TransactionKind::Issue | TransactionKind::Scrap => {
                if quantity.is_sign_negative() {
                    return Err(DomainError::validation(format!(
                        "{kind} quantity must be positive"
                    )));
                }
                -quantity
            }
            TransactionKind::Adjust | TransactionKind::Transfer => quantity,
        };
        Ok(Self { kind, delta })
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn delta(&self) -> Decimal {
        self.delta
    }
}
