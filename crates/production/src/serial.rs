//! Per-unit serial numbers and their lifecycle.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgemrp_core::{DomainError, DomainResult, Entity, PartKey, SerialNumber, WorkOrderId};

use crate::work_order::{WorkOrder, WorkOrderStatus};

const PREFIX_MAX: usize = 4;
const FALLBACK_PREFIX: &str = "SN";
const TIMESTAMP_FORMAT: &str = "%y%m%d%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialStatus {
    Building,
    Testing,
    Complete,
    Failed,
    Scrapped,
}

impl SerialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerialStatus::Building => "building",
            SerialStatus::Testing => "testing",
            SerialStatus::Complete => "complete",
            SerialStatus::Failed => "failed",
            SerialStatus::Scrapped => "scrapped",
        }
    }

    pub fn can_transition(self, to: SerialStatus) -> bool {
        use SerialStatus::*;
        matches!(
            (self, to),
            (Building, Testing)
                | (Building, Failed)
                | (Building, Scrapped)
                | (Testing, Complete)
        )
    }
}

impl core::fmt::Display for SerialStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SerialStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "building" => Ok(SerialStatus::Building),
            "testing" => Ok(SerialStatus::Testing),
            "complete" => Ok(SerialStatus::Complete),
            "failed" => Ok(SerialStatus::Failed),
            "scrapped" => Ok(SerialStatus::Scrapped),
            other => Err(DomainError::validation(format!(
                "serial status must be one of: building, testing, complete, failed, scrapped (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSerial {
    serial: SerialNumber,
    work_order_id: WorkOrderId,
    status: SerialStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UnitSerial {
    /// Register a unit against `order`. Uniqueness is checked by the store.
    pub fn assign(
        order: &WorkOrder,
        serial: SerialNumber,
        initial: Option<SerialStatus>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if order.status() == WorkOrderStatus::Cancelled {
            return Err(DomainError::conflict(format!(
                "work order {} is cancelled; units cannot be registered",
                order.id_typed()
            )));
        }
        let status = initial.unwrap_or(SerialStatus::Building);
        if !matches!(status, SerialStatus::Building | SerialStatus::Testing) {
            return Err(DomainError::validation(format!(
                "units start as building or testing, not {status}"
            )));
        }
        Ok(Self {
            serial,
            work_order_id: order.id_typed(),
            status,
            notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn restore(
        serial: SerialNumber,
        work_order_id: WorkOrderId,
        status: SerialStatus,
        notes: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            serial,
            work_order_id,
            status,
            notes,
            created_at,
            updated_at,
        }
    }

    pub fn serial(&self) -> &SerialNumber {
        &self.serial
    }

    pub fn work_order_id(&self) -> WorkOrderId {
        self.work_order_id
    }

    pub fn status(&self) -> SerialStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Move to `to`, optionally replacing notes. Rejected moves leave the unit
    /// unchanged.
    pub fn transition(
        &mut self,
        to: SerialStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.can_transition(to) {
            return Err(DomainError::conflict(format!(
                "invalid serial transition {} -> {} for {}",
                self.status, to, self.serial
            )));
        }
        self.status = to;
        if let Some(n) = notes {
            self.notes = Some(n.trim().to_string()).filter(|n| !n.is_empty());
        }
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for UnitSerial {
    type Id = SerialNumber;

    fn id(&self) -> &Self::Id {
        &self.serial
    }
}

/// Reverse-trace answer: the unit plus the order and assembly that built it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub unit: UnitSerial,
    pub work_order_id: WorkOrderId,
    pub assembly: PartKey,
    pub work_order_status: WorkOrderStatus,
}

impl TraceRecord {
    pub fn new(unit: UnitSerial, order: &WorkOrder) -> Self {
        Self {
            work_order_id: order.id_typed(),
            assembly: order.assembly().clone(),
            work_order_status: order.status(),
            unit,
        }
    }
}

/// First alphanumeric run of the assembly key, upper-cased, at most four
/// characters.
pub fn serial_prefix(assembly: &PartKey) -> String {
    let prefix: String = assembly
        .as_str()
        .chars()
        .skip_while(|c| !c.is_ascii_alphanumeric())
        .take_while(|c| c.is_ascii_alphanumeric())
        .take(PREFIX_MAX)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if prefix.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        prefix
    }
}

/// `<prefix><yymmddHHMMSS>`, e.g. `PCA240611093012`.
///
/// `attempt` > 1 appends `-<attempt>`; the store bumps it while the candidate
/// is taken.
pub fn generate_serial(
    assembly: &PartKey,
    at: DateTime<Utc>,
    attempt: u32,
) -> DomainResult<SerialNumber> {
    let base = format!("{}{}", serial_prefix(assembly), at.format(TIMESTAMP_FORMAT));
    if attempt > 1 {
        SerialNumber::parse(format!("{base}-{attempt}"))
    } else {
        SerialNumber::parse(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_order::Priority;
    use chrono::TimeZone;
    use forgemrp_core::Quantity;
    use SerialStatus::*;

    fn part(s: &str) -> PartKey {
        PartKey::parse(s).unwrap()
    }

    fn test_order(status: WorkOrderStatus) -> WorkOrder {
        let now = Utc::now();
        WorkOrder::restore(
            WorkOrderId::new(),
            part("PCA-MAIN-V1.0"),
            Quantity::from(5),
            Quantity::ZERO,
            Quantity::ZERO,
            status,
            Priority::Normal,
            None,
            None,
            now,
            None,
            None,
            now,
        )
    }

    fn serial(s: &str) -> SerialNumber {
        SerialNumber::parse(s).unwrap()
    }

    #[test]
    fn generated_serial_starts_with_assembly_prefix() {
        let at = Utc.with_ymd_and_hms(2024, 6, 11, 9, 30, 12).unwrap();
        let sn = generate_serial(&part("PCA-MAIN-V1.0"), at, 1).unwrap();

        assert_eq!(sn.as_str(), "PCA240611093012");
        assert!(sn.as_str().starts_with("PCA"));
        assert!(sn.as_str().len() >= 15);
    }

    #[test]
    fn retries_get_a_numeric_suffix() {
        let at = Utc.with_ymd_and_hms(2024, 6, 11, 9, 30, 12).unwrap();
        let sn = generate_serial(&part("PCA-MAIN-V1.0"), at, 3).unwrap();
        assert_eq!(sn.as_str(), "PCA240611093012-3");
    }

    #[test]
    fn prefix_is_truncated_uppercased_and_has_fallback() {
        assert_eq!(serial_prefix(&part("motorboard")), "MOTO");
        assert_eq!(serial_prefix(&part("pca.main")), "PCA");
        assert_eq!(serial_prefix(&part("--x1")), "X1");
        assert_eq!(serial_prefix(&part("___")), "SN");
    }

    #[test]
    fn serial_lifecycle_transitions() {
        for (from, to) in [
            (Building, Testing),
            (Testing, Complete),
            (Building, Failed),
            (Building, Scrapped),
        ] {
            assert!(from.can_transition(to), "{from} -> {to} should be allowed");
        }
        for (from, to) in [
            (Building, Complete),
            (Testing, Failed),
            (Testing, Scrapped),
            (Complete, Testing),
            (Failed, Building),
            (Scrapped, Testing),
            (Testing, Building),
        ] {
            assert!(!from.can_transition(to), "{from} -> {to} should be rejected");
        }
    }

    #[test]
    fn rejected_transition_leaves_unit_unchanged() {
        let order = test_order(WorkOrderStatus::InProgress);
        let mut unit = UnitSerial::assign(&order, serial("SN-001"), None, None, Utc::now()).unwrap();
        let before = unit.clone();

        let err = unit.transition(Complete, Some("skip test".into()), Utc::now()).unwrap_err();

        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(unit, before);
    }

    #[test]
    fn cancelled_orders_cannot_take_new_units() {
        let order = test_order(WorkOrderStatus::Cancelled);
        let err = UnitSerial::assign(&order, serial("SN-001"), None, None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn units_cannot_start_finished() {
        let order = test_order(WorkOrderStatus::Open);
        assert!(UnitSerial::assign(&order, serial("SN-1"), Some(Testing), None, Utc::now()).is_ok());
        assert!(matches!(
            UnitSerial::assign(&order, serial("SN-2"), Some(Complete), None, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn trace_record_points_back_to_the_order() {
        let order = test_order(WorkOrderStatus::InProgress);
        let unit = UnitSerial::assign(&order, serial("SN-001"), None, None, Utc::now()).unwrap();
        let trace = TraceRecord::new(unit, &order);
        assert_eq!(trace.work_order_id, order.id_typed());
        assert_eq!(trace.assembly, part("PCA-MAIN-V1.0"));
    }
}
