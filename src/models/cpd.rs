//! Continuing professional development and recertification cycles

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{add_years, CERTIFICATION_CYCLE_YEARS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum CpdStatus {
    Pending,
    Approved,
    Rejected,
}

impl CpdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// An assessor's submitted CPD activity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct CpdLog {
    pub cpd_log_id: Uuid,
    pub assessor_id: Uuid,
    pub activity_type: String,
    pub activity_title: String,
    pub activity_date: NaiveDate,
    pub hours: Decimal,
    pub description: Option<String>,
    pub evidence_filename: Option<String>,
    pub evidence_stored_id: Option<String>,
    pub status: CpdStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum CycleStatus {
    Active,
    Completed,
    Lapsed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Lapsed => "lapsed",
        }
    }
}

/// Three-year recertification window; at most one active per assessor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct RecertificationRecord {
    pub record_id: Uuid,
    pub assessor_id: Uuid,
    pub cycle_start: NaiveDate,
    pub cycle_end: NaiveDate,
    pub required_hours: Decimal,
    pub accumulated_hours: Decimal,
    pub status: CycleStatus,
    pub closed_at: Option<DateTime<Utc>>,
}

impl RecertificationRecord {
    pub fn open(assessor_id: Uuid, cycle_start: NaiveDate, required_hours: Decimal) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            assessor_id,
            cycle_start,
            cycle_end: add_years(cycle_start, CERTIFICATION_CYCLE_YEARS),
            required_hours,
            accumulated_hours: Decimal::ZERO,
            status: CycleStatus::Active,
            closed_at: None,
        }
    }

    pub fn has_sufficient_hours(&self) -> bool {
        self.accumulated_hours >= self.required_hours
    }

    pub fn remaining_hours(&self) -> Decimal {
        (self.required_hours - self.accumulated_hours).max(Decimal::ZERO)
    }

    /// Active, past its end date and short of hours
    pub fn should_lapse(&self, today: NaiveDate) -> bool {
        self.status == CycleStatus::Active
            && self.cycle_end < today
            && !self.has_sufficient_hours()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_spans_three_years() {
        let start = NaiveDate::from_ymd_opt(2022, 9, 1).unwrap();
        let record = RecertificationRecord::open(Uuid::new_v4(), start, Decimal::from(60));
        assert_eq!(record.cycle_end, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
        assert_eq!(record.remaining_hours(), Decimal::from(60));
    }

    #[test]
    fn test_lapse_requires_past_end_and_shortfall() {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let mut record = RecertificationRecord::open(Uuid::new_v4(), start, Decimal::from(60));
        let end = record.cycle_end;

        assert!(!record.should_lapse(end));
        assert!(record.should_lapse(end.succ_opt().unwrap()));

        record.accumulated_hours = Decimal::from(60);
        assert!(!record.should_lapse(end.succ_opt().unwrap()));
        assert_eq!(record.remaining_hours(), Decimal::ZERO);
    }
}
