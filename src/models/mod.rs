//! Entity model
//!
//! Plain records owned by the [`PortalStore`](crate::store::PortalStore).
//! Status columns are closed enums stored as snake_case text.

mod checklist;
mod collab;
mod cpd;
mod directory;
mod document;
mod notification;
mod project;
mod reminder;

pub use checklist::{CheckType, ChecklistItem, QualityChecklistItem};
pub use collab::{Announcement, AnnouncementPriority, ChatMessage};
pub use cpd::{CpdLog, CpdStatus, CycleStatus, RecertificationRecord};
pub use directory::{Client, Glab, GlabStatus, LicenseType, User};
pub use document::{Document, PhaseTemplate, ReviewOutcome, ReviewStatus};
pub use notification::{LinkType, Notification, NotificationType};
pub use project::{
    AssessmentType, MemberKind, PaymentMilestone, PhaseAction, PhaseLog, PhaseReview, Project,
    ProjectMember, GEA_FEE_RATE,
};
pub use reminder::{ReminderKey, ReminderType, ScheduledReminder, TargetType};

use chrono::{Months, NaiveDate};

/// Certification and recertification cycles last three years
pub const CERTIFICATION_CYCLE_YEARS: u32 = 3;

/// Calendar-aware year addition; Feb 29 clamps to Feb 28
pub fn add_years(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_add_months(Months::new(years * 12))
        .unwrap_or(NaiveDate::MAX)
}
