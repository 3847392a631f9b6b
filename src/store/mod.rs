//! Entity Store
//!
//! Persistence trait for every portal record. The workflow engine, the
//! notification dispatcher and the reminder scheduler operate exclusively
//! through this trait, so backends are pluggable (`MemoryStore` for tests and
//! single-process runs, `PgPortalStore` for production).
//!
//! Methods that guard a state transition are single atomic primitives: they
//! return `None`/`false` when the guard no longer holds instead of writing.

mod memory;
#[cfg(feature = "database")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgPortalStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::PortalResult;
use crate::models::*;
use crate::permissions::Role;

/// User listing filter. Empty `roles` matches every role.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub roles: Vec<Role>,
    pub glab_id: Option<Uuid>,
    pub active_only: bool,
}

impl UserQuery {
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    pub fn with_roles(mut self, roles: &[Role]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    pub fn in_glab(mut self, glab_id: Uuid) -> Self {
        self.glab_id = Some(glab_id);
        self
    }

    pub fn matches(&self, user: &User) -> bool {
        (!self.active_only || user.is_active)
            && (self.roles.is_empty() || self.roles.contains(&user.role))
            && self.glab_id.is_none_or(|g| user.glab_id == Some(g))
    }
}

/// Which projects a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectScope {
    All,
    Glab(Uuid),
    Client(Uuid),
    /// Projects the user is a member of, in any capacity
    Member(Uuid),
}

/// Atomic review write for a document
#[derive(Debug, Clone)]
pub struct DocumentReviewUpdate {
    pub document_id: Uuid,
    pub outcome: ReviewOutcome,
    pub reviewed_by: Uuid,
    pub reviewed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Atomic review write for a CPD log
#[derive(Debug, Clone)]
pub struct CpdReviewUpdate {
    pub cpd_log_id: Uuid,
    pub approve: bool,
    pub reviewed_by: Uuid,
    pub reviewed_at: DateTime<Utc>,
    pub notes: Option<String>,
    /// Active record credited with the hours on approval
    pub credit_record_id: Option<Uuid>,
}

/// Atomic certification renewal: close the active cycle, re-certify the
/// assessor and open the next cycle
#[derive(Debug, Clone)]
pub struct CertificationRenewal {
    pub closing_record_id: Uuid,
    pub closed_at: DateTime<Utc>,
    pub assessor_id: Uuid,
    pub certification_date: NaiveDate,
    pub recertification_due: NaiveDate,
    pub next: RecertificationRecord,
}

#[async_trait]
pub trait PortalStore: Send + Sync {
    // ── Users ──

    /// `Conflict` on duplicate username or email
    async fn insert_user(&self, user: &User) -> PortalResult<()>;
    async fn get_user(&self, user_id: Uuid) -> PortalResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> PortalResult<Option<User>>;
    async fn update_user(&self, user: &User) -> PortalResult<()>;
    async fn list_users(&self, query: &UserQuery) -> PortalResult<Vec<User>>;
    /// Flip only the active flag; `None` if the user does not exist
    async fn set_user_active(&self, user_id: Uuid, active: bool) -> PortalResult<Option<User>>;
    /// Flip only the email preference; `None` if the user does not exist
    async fn set_email_notifications(&self, user_id: Uuid, enabled: bool)
        -> PortalResult<Option<User>>;

    // ── GLABs ──

    /// `Conflict` on duplicate license number
    async fn insert_glab(&self, glab: &Glab) -> PortalResult<()>;
    async fn get_glab(&self, glab_id: Uuid) -> PortalResult<Option<Glab>>;
    async fn update_glab(&self, glab: &Glab) -> PortalResult<()>;
    async fn list_glabs(&self) -> PortalResult<Vec<Glab>>;
    /// Active GLABs whose next license payment falls on `due`
    async fn glabs_with_payment_due(&self, due: NaiveDate) -> PortalResult<Vec<Glab>>;

    // ── Clients ──

    async fn insert_client(&self, client: &Client) -> PortalResult<()>;
    async fn get_client(&self, client_id: Uuid) -> PortalResult<Option<Client>>;
    async fn list_clients(&self, glab_id: Option<Uuid>) -> PortalResult<Vec<Client>>;

    // ── Projects ──

    /// Insert a project together with its seeded checklists and first log entry
    async fn create_project(
        &self,
        project: &Project,
        checklist: &[ChecklistItem],
        quality_checklist: &[QualityChecklistItem],
        log: &PhaseLog,
    ) -> PortalResult<()>;
    async fn get_project(&self, project_id: Uuid) -> PortalResult<Option<Project>>;
    async fn list_projects(&self, scope: ProjectScope) -> PortalResult<Vec<Project>>;
    async fn count_projects_for_glab_year(&self, glab_id: Uuid, year: i32) -> PortalResult<i64>;

    /// Move the project from `expected_phase` to `log.to_phase`, reset
    /// `gea_status` to pending and append `log`. `None` if the phase moved.
    async fn move_project_phase(
        &self,
        project_id: Uuid,
        expected_phase: i32,
        log: &PhaseLog,
    ) -> PortalResult<Option<Project>>;

    /// Set the milestone once. `None` if it was already recorded.
    async fn record_payment(
        &self,
        project_id: Uuid,
        milestone: PaymentMilestone,
        paid_on: NaiveDate,
    ) -> PortalResult<Option<Project>>;

    async fn phase_history(&self, project_id: Uuid) -> PortalResult<Vec<PhaseLog>>;

    // ── Phase reviews ──

    /// Append the review and mirror its outcome into `gea_status`, provided the
    /// project still sits in `review.phase_number`. `None` otherwise.
    async fn record_phase_review(&self, review: &PhaseReview) -> PortalResult<Option<Project>>;
    async fn latest_phase_review(
        &self,
        project_id: Uuid,
        phase_number: i32,
    ) -> PortalResult<Option<PhaseReview>>;
    async fn phase_reviews(&self, project_id: Uuid) -> PortalResult<Vec<PhaseReview>>;

    // ── Membership ──

    /// `false` if the membership already existed
    async fn add_member(&self, member: &ProjectMember) -> PortalResult<bool>;
    /// `false` if there was nothing to remove
    async fn remove_member(
        &self,
        project_id: Uuid,
        kind: MemberKind,
        user_id: Uuid,
    ) -> PortalResult<bool>;
    async fn project_members(&self, project_id: Uuid) -> PortalResult<Vec<ProjectMember>>;

    // ── Checklists ──

    async fn checklist(
        &self,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<ChecklistItem>>;
    async fn quality_checklist(
        &self,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<QualityChecklistItem>>;
    async fn get_checklist_item(&self, item_id: Uuid) -> PortalResult<Option<ChecklistItem>>;
    async fn get_quality_item(&self, item_id: Uuid) -> PortalResult<Option<QualityChecklistItem>>;
    async fn insert_checklist_item(&self, item: &ChecklistItem) -> PortalResult<()>;
    /// Flip completion in place
    async fn toggle_checklist_item(
        &self,
        item_id: Uuid,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> PortalResult<Option<ChecklistItem>>;
    async fn toggle_quality_item(
        &self,
        item_id: Uuid,
        by: Uuid,
        at: DateTime<Utc>,
        notes: Option<String>,
    ) -> PortalResult<Option<QualityChecklistItem>>;

    // ── Documents ──

    /// `Conflict` if (project, phase, key, version) already exists
    async fn insert_document(&self, document: &Document) -> PortalResult<()>;
    async fn get_document(&self, document_id: Uuid) -> PortalResult<Option<Document>>;
    async fn latest_document(
        &self,
        project_id: Uuid,
        phase_number: i32,
        document_key: &str,
    ) -> PortalResult<Option<Document>>;
    async fn documents(
        &self,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<Document>>;
    /// Latest versions awaiting review, oldest first
    async fn pending_documents(&self) -> PortalResult<Vec<Document>>;
    /// Apply the outcome if the document is pending and has no newer version
    async fn review_document(&self, update: &DocumentReviewUpdate)
        -> PortalResult<Option<Document>>;

    // ── Phase templates ──

    /// Insert as the active template of its slot, retiring the previous one
    async fn insert_phase_template(&self, template: &PhaseTemplate) -> PortalResult<()>;
    async fn get_phase_template(&self, template_id: Uuid) -> PortalResult<Option<PhaseTemplate>>;
    /// Ordered by phase, then slot, newest first
    async fn list_phase_templates(
        &self,
        phase_number: Option<i32>,
        active_only: bool,
    ) -> PortalResult<Vec<PhaseTemplate>>;

    // ── Notifications ──

    async fn insert_notification(&self, notification: &Notification) -> PortalResult<()>;
    async fn mark_email_sent(&self, notification_id: Uuid, at: DateTime<Utc>)
        -> PortalResult<()>;
    async fn get_notification(&self, notification_id: Uuid)
        -> PortalResult<Option<Notification>>;
    /// Newest first
    async fn list_notifications(&self, user_id: Uuid, limit: i64)
        -> PortalResult<Vec<Notification>>;
    /// `false` if the notification does not belong to `user_id`
    async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> PortalResult<bool>;
    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> PortalResult<u64>;
    async fn unread_count(&self, user_id: Uuid) -> PortalResult<i64>;

    // ── Collaboration ──

    async fn insert_chat_message(&self, message: &ChatMessage) -> PortalResult<()>;
    /// Oldest first, optionally only after `since`
    async fn chat_messages(
        &self,
        project_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> PortalResult<Vec<ChatMessage>>;
    async fn insert_announcement(&self, announcement: &Announcement) -> PortalResult<()>;
    async fn list_announcements(&self) -> PortalResult<Vec<Announcement>>;
    async fn deactivate_announcement(&self, announcement_id: Uuid) -> PortalResult<bool>;

    // ── CPD and recertification ──

    async fn insert_cpd_log(&self, log: &CpdLog) -> PortalResult<()>;
    async fn get_cpd_log(&self, cpd_log_id: Uuid) -> PortalResult<Option<CpdLog>>;
    async fn list_cpd_logs(
        &self,
        assessor_id: Option<Uuid>,
        status: Option<CpdStatus>,
    ) -> PortalResult<Vec<CpdLog>>;
    /// Review a pending log and, on approval, credit its hours in one step
    async fn review_cpd_log(&self, update: &CpdReviewUpdate) -> PortalResult<Option<CpdLog>>;

    /// `Conflict` if the assessor already has an active record
    async fn insert_recertification(&self, record: &RecertificationRecord) -> PortalResult<()>;
    async fn get_recertification(&self, record_id: Uuid)
        -> PortalResult<Option<RecertificationRecord>>;
    async fn active_recertification(
        &self,
        assessor_id: Uuid,
    ) -> PortalResult<Option<RecertificationRecord>>;
    async fn list_recertifications(
        &self,
        status: Option<CycleStatus>,
    ) -> PortalResult<Vec<RecertificationRecord>>;
    /// Close an active record. `None` if it was no longer active.
    async fn close_recertification(
        &self,
        record_id: Uuid,
        status: CycleStatus,
        at: DateTime<Utc>,
    ) -> PortalResult<Option<RecertificationRecord>>;
    /// Apply a renewal in one step. `None` and nothing written if the
    /// closing record was no longer active.
    async fn renew_certification(
        &self,
        renewal: &CertificationRenewal,
    ) -> PortalResult<Option<RecertificationRecord>>;

    /// Active assessors whose recertification falls due on `due`
    async fn assessors_with_recertification_due(&self, due: NaiveDate)
        -> PortalResult<Vec<User>>;
    /// Active records ending on `end` with fewer than their required hours
    async fn records_short_of_hours_ending(
        &self,
        end: NaiveDate,
    ) -> PortalResult<Vec<RecertificationRecord>>;
    /// Active records that ended before `today` with fewer than required hours
    async fn records_to_lapse(&self, today: NaiveDate)
        -> PortalResult<Vec<RecertificationRecord>>;

    // ── Reminder ledger ──

    /// Take the dispatch lease on an unsent ledger row, inserting it unsent if
    /// absent. A lease taken before `stale_before` counts as abandoned.
    /// `true` only for the caller that now holds the lease.
    async fn claim_reminder(
        &self,
        key: &ReminderKey,
        due_date: NaiveDate,
        at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> PortalResult<bool>;
    /// Mark a claimed row sent and drop its lease
    async fn mark_reminder_sent(&self, key: &ReminderKey, at: DateTime<Utc>)
        -> PortalResult<()>;
    /// Drop the lease without marking sent so the next cycle retries
    async fn release_reminder(&self, key: &ReminderKey) -> PortalResult<()>;
    async fn get_reminder(&self, key: &ReminderKey) -> PortalResult<Option<ScheduledReminder>>;
    async fn list_reminders(&self) -> PortalResult<Vec<ScheduledReminder>>;
}

/// Sum of approved CPD hours in a set of logs
pub fn approved_hours(logs: &[CpdLog]) -> Decimal {
    logs.iter()
        .filter(|l| l.status == CpdStatus::Approved)
        .map(|l| l.hours)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_query_matching() {
        let glab = Uuid::new_v4();
        let mut admin = User::new("labadmin", "admin@lab.test", Role::GlabAdmin);
        admin.glab_id = Some(glab);

        assert!(UserQuery::active().matches(&admin));
        assert!(UserQuery::active()
            .with_roles(&[Role::GlabAdmin])
            .in_glab(glab)
            .matches(&admin));
        assert!(!UserQuery::active()
            .with_roles(&[Role::GeaAdmin, Role::GeaStaff])
            .matches(&admin));
        assert!(!UserQuery::active().in_glab(Uuid::new_v4()).matches(&admin));

        admin.is_active = false;
        assert!(!UserQuery::active().matches(&admin));
        assert!(UserQuery::default().matches(&admin));
    }
}
