//! Reminder deduplication ledger

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "snake_case")
)]
pub enum ReminderType {
    LicensePayment,
    CpdCompliance,
    Recertification,
}

impl ReminderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LicensePayment => "license_payment",
            Self::CpdCompliance => "cpd_compliance",
            Self::Recertification => "recertification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "snake_case")
)]
pub enum TargetType {
    Glab,
    Assessor,
    RecertificationRecord,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Glab => "glab",
            Self::Assessor => "assessor",
            Self::RecertificationRecord => "recertification_record",
        }
    }
}

/// Uniqueness key of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderKey {
    pub reminder_type: ReminderType,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub days_before: i32,
}

impl std::fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.reminder_type.as_str(),
            self.target_type.as_str(),
            self.target_id,
            self.days_before
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct ScheduledReminder {
    pub reminder_id: Uuid,
    pub reminder_type: ReminderType,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub due_date: NaiveDate,
    pub days_before: i32,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    /// Set while a cycle holds the row and is dispatching
    pub claimed_at: Option<DateTime<Utc>>,
}

impl ScheduledReminder {
    pub fn key(&self) -> ReminderKey {
        ReminderKey {
            reminder_type: self.reminder_type,
            target_type: self.target_type,
            target_id: self.target_id,
            days_before: self.days_before,
        }
    }
}
