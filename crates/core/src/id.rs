//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a work order (production order).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkOrderId(Uuid);

impl WorkOrderId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Short human-facing reference used on ledger transactions (`WO-<id>`).
    pub fn reference(&self) -> String {
        format!("WO-{}", self.0)
    }
}

impl Default for WorkOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for WorkOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for WorkOrderId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<WorkOrderId> for Uuid {
    fn from(value: WorkOrderId) -> Self {
        value.0
    }
}

impl FromStr for WorkOrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("WorkOrderId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Longest accepted part key / serial string.
pub const MAX_KEY_LEN: usize = 64;

macro_rules! impl_string_key {
    ($t:ident, $name:literal) => {
        impl $t {
            /// Parse and validate a key (trimmed, non-empty, no inner whitespace).
            pub fn parse(raw: impl AsRef<str>) -> Result<Self, DomainError> {
                let s = raw.as_ref().trim();
                if s.is_empty() {
                    return Err(DomainError::validation(concat!($name, " cannot be empty")));
                }
                if s.len() > MAX_KEY_LEN {
                    return Err(DomainError::validation(format!(
                        "{} longer than {} characters",
                        $name, MAX_KEY_LEN
                    )));
                }
                if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
                    return Err(DomainError::validation(concat!(
                        $name,
                        " cannot contain whitespace"
                    )));
                }
                Ok(Self(s.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Stock-keeping unit identifier (a part number such as `PCA-MAIN-V1.0`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartKey(String);

/// Globally unique per-unit serial number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SerialNumber(String);

impl_string_key!(PartKey, "part key");
impl_string_key!(SerialNumber, "serial number");
