//! In-memory `PortalStore`
//!
//! Every table lives behind one `RwLock`, so each trait method is atomic with
//! respect to every other. Used by tests and by the binary when no
//! `DATABASE_URL` is configured.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CertificationRenewal, CpdReviewUpdate, DocumentReviewUpdate, PortalStore, ProjectScope,
    UserQuery,
};
use crate::error::{PortalError, PortalResult};
use crate::models::*;
use crate::permissions::Role;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    glabs: HashMap<Uuid, Glab>,
    clients: HashMap<Uuid, Client>,
    projects: HashMap<Uuid, Project>,
    members: Vec<ProjectMember>,
    phase_logs: Vec<PhaseLog>,
    phase_reviews: Vec<PhaseReview>,
    checklist: HashMap<Uuid, ChecklistItem>,
    quality: HashMap<Uuid, QualityChecklistItem>,
    documents: HashMap<Uuid, Document>,
    templates: HashMap<Uuid, PhaseTemplate>,
    notifications: HashMap<Uuid, Notification>,
    chat: Vec<ChatMessage>,
    announcements: HashMap<Uuid, Announcement>,
    cpd_logs: HashMap<Uuid, CpdLog>,
    recertifications: HashMap<Uuid, RecertificationRecord>,
    reminders: HashMap<ReminderKey, ScheduledReminder>,
}

impl Tables {
    fn has_newer_version(&self, document: &Document) -> bool {
        self.documents
            .values()
            .any(|d| d.parent_id == Some(document.document_id))
    }

    fn is_member(&self, project_id: Uuid, user_id: Uuid) -> bool {
        self.members
            .iter()
            .any(|m| m.project_id == project_id && m.user_id == user_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing_user_queries: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `list_users` fail until reset, to exercise recipient lookup errors
    pub fn set_failing_user_queries(&self, failing: bool) {
        self.failing_user_queries.store(failing, Ordering::SeqCst);
    }
}

fn sorted_by<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|r| key(r));
    rows
}

#[async_trait]
impl PortalStore for MemoryStore {
    // ── Users ──

    async fn insert_user(&self, user: &User) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        if t.users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(PortalError::conflict(format!(
                "username or email already registered: {}",
                user.username
            )));
        }
        t.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> PortalResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> PortalResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn update_user(&self, user: &User) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| {
            u.user_id != user.user_id && (u.username == user.username || u.email == user.email)
        }) {
            return Err(PortalError::conflict(format!(
                "username or email already registered: {}",
                user.username
            )));
        }
        match t.users.get_mut(&user.user_id) {
            Some(row) => {
                *row = user.clone();
                Ok(())
            }
            None => Err(PortalError::not_found("user", user.user_id)),
        }
    }

    async fn list_users(&self, query: &UserQuery) -> PortalResult<Vec<User>> {
        if self.failing_user_queries.load(Ordering::SeqCst) {
            return Err(PortalError::Storage("user query unavailable".into()));
        }
        let t = self.tables.read().await;
        let rows = t.users.values().filter(|u| query.matches(u)).cloned().collect();
        Ok(sorted_by(rows, |u: &User| u.username.clone()))
    }

    async fn set_user_active(&self, user_id: Uuid, active: bool) -> PortalResult<Option<User>> {
        let mut t = self.tables.write().await;
        Ok(t.users.get_mut(&user_id).map(|u| {
            u.is_active = active;
            u.clone()
        }))
    }

    async fn set_email_notifications(
        &self,
        user_id: Uuid,
        enabled: bool,
    ) -> PortalResult<Option<User>> {
        let mut t = self.tables.write().await;
        Ok(t.users.get_mut(&user_id).map(|u| {
            u.email_notifications = enabled;
            u.clone()
        }))
    }

    // ── GLABs ──

    async fn insert_glab(&self, glab: &Glab) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        if t.glabs
            .values()
            .any(|g| g.license_number == glab.license_number)
        {
            return Err(PortalError::conflict(format!(
                "license number already registered: {}",
                glab.license_number
            )));
        }
        t.glabs.insert(glab.glab_id, glab.clone());
        Ok(())
    }

    async fn get_glab(&self, glab_id: Uuid) -> PortalResult<Option<Glab>> {
        Ok(self.tables.read().await.glabs.get(&glab_id).cloned())
    }

    async fn update_glab(&self, glab: &Glab) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        match t.glabs.get_mut(&glab.glab_id) {
            Some(row) => {
                *row = glab.clone();
                Ok(())
            }
            None => Err(PortalError::not_found("glab", glab.glab_id)),
        }
    }

    async fn list_glabs(&self) -> PortalResult<Vec<Glab>> {
        let t = self.tables.read().await;
        let rows = t.glabs.values().cloned().collect();
        Ok(sorted_by(rows, |g: &Glab| g.name.clone()))
    }

    async fn glabs_with_payment_due(&self, due: NaiveDate) -> PortalResult<Vec<Glab>> {
        let t = self.tables.read().await;
        Ok(t.glabs
            .values()
            .filter(|g| g.is_active() && g.next_payment_due == Some(due))
            .cloned()
            .collect())
    }

    // ── Clients ──

    async fn insert_client(&self, client: &Client) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        t.clients.insert(client.client_id, client.clone());
        Ok(())
    }

    async fn get_client(&self, client_id: Uuid) -> PortalResult<Option<Client>> {
        Ok(self.tables.read().await.clients.get(&client_id).cloned())
    }

    async fn list_clients(&self, glab_id: Option<Uuid>) -> PortalResult<Vec<Client>> {
        let t = self.tables.read().await;
        let rows = t
            .clients
            .values()
            .filter(|c| glab_id.is_none() || c.glab_id == glab_id)
            .cloned()
            .collect();
        Ok(sorted_by(rows, |c: &Client| c.name.clone()))
    }

    // ── Projects ──

    async fn create_project(
        &self,
        project: &Project,
        checklist: &[ChecklistItem],
        quality_checklist: &[QualityChecklistItem],
        log: &PhaseLog,
    ) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        if t.projects
            .values()
            .any(|p| p.reference_number == project.reference_number)
        {
            return Err(PortalError::conflict(format!(
                "reference number already used: {}",
                project.reference_number
            )));
        }
        t.projects.insert(project.project_id, project.clone());
        for item in checklist {
            t.checklist.insert(item.item_id, item.clone());
        }
        for item in quality_checklist {
            t.quality.insert(item.item_id, item.clone());
        }
        t.phase_logs.push(log.clone());
        Ok(())
    }

    async fn get_project(&self, project_id: Uuid) -> PortalResult<Option<Project>> {
        Ok(self.tables.read().await.projects.get(&project_id).cloned())
    }

    async fn list_projects(&self, scope: ProjectScope) -> PortalResult<Vec<Project>> {
        let t = self.tables.read().await;
        let rows = t
            .projects
            .values()
            .filter(|p| match scope {
                ProjectScope::All => true,
                ProjectScope::Glab(id) => p.glab_id == id,
                ProjectScope::Client(id) => p.client_id == id,
                ProjectScope::Member(user_id) => t.is_member(p.project_id, user_id),
            })
            .cloned()
            .collect::<Vec<_>>();
        let mut rows = sorted_by(rows, |p: &Project| p.created_at);
        rows.reverse();
        Ok(rows)
    }

    async fn count_projects_for_glab_year(&self, glab_id: Uuid, year: i32) -> PortalResult<i64> {
        let t = self.tables.read().await;
        Ok(t.projects
            .values()
            .filter(|p| p.glab_id == glab_id && p.created_at.year() == year)
            .count() as i64)
    }

    async fn move_project_phase(
        &self,
        project_id: Uuid,
        expected_phase: i32,
        log: &PhaseLog,
    ) -> PortalResult<Option<Project>> {
        let mut t = self.tables.write().await;
        let Some(project) = t.projects.get_mut(&project_id) else {
            return Err(PortalError::not_found("project", project_id));
        };
        if project.current_phase != expected_phase {
            return Ok(None);
        }
        project.current_phase = log.to_phase;
        project.gea_status = ReviewStatus::Pending;
        project.gea_notes = None;
        project.gea_reviewed_by = None;
        project.gea_reviewed_at = None;
        let updated = project.clone();
        t.phase_logs.push(log.clone());
        Ok(Some(updated))
    }

    async fn record_payment(
        &self,
        project_id: Uuid,
        milestone: PaymentMilestone,
        paid_on: NaiveDate,
    ) -> PortalResult<Option<Project>> {
        let mut t = self.tables.write().await;
        let Some(project) = t.projects.get_mut(&project_id) else {
            return Err(PortalError::not_found("project", project_id));
        };
        if project.record_milestone(milestone, paid_on) {
            Ok(Some(project.clone()))
        } else {
            Ok(None)
        }
    }

    async fn phase_history(&self, project_id: Uuid) -> PortalResult<Vec<PhaseLog>> {
        let t = self.tables.read().await;
        Ok(t.phase_logs
            .iter()
            .filter(|l| l.project_id == project_id)
            .cloned()
            .collect())
    }

    // ── Phase reviews ──

    async fn record_phase_review(&self, review: &PhaseReview) -> PortalResult<Option<Project>> {
        let mut t = self.tables.write().await;
        let Some(project) = t.projects.get_mut(&review.project_id) else {
            return Err(PortalError::not_found("project", review.project_id));
        };
        if project.current_phase != review.phase_number {
            return Ok(None);
        }
        project.gea_status = review.outcome.status();
        project.gea_notes = review.notes.clone();
        project.gea_reviewed_by = Some(review.reviewer_id);
        project.gea_reviewed_at = Some(review.reviewed_at);
        let updated = project.clone();
        t.phase_reviews.push(review.clone());
        Ok(Some(updated))
    }

    async fn latest_phase_review(
        &self,
        project_id: Uuid,
        phase_number: i32,
    ) -> PortalResult<Option<PhaseReview>> {
        let t = self.tables.read().await;
        // max_by_key keeps the last maximum, so later inserts win ties
        Ok(t.phase_reviews
            .iter()
            .filter(|r| r.project_id == project_id && r.phase_number == phase_number)
            .max_by_key(|r| r.reviewed_at)
            .cloned())
    }

    async fn phase_reviews(&self, project_id: Uuid) -> PortalResult<Vec<PhaseReview>> {
        let t = self.tables.read().await;
        Ok(t.phase_reviews
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }

    // ── Membership ──

    async fn add_member(&self, member: &ProjectMember) -> PortalResult<bool> {
        let mut t = self.tables.write().await;
        if t.members.iter().any(|m| {
            m.project_id == member.project_id && m.user_id == member.user_id && m.kind == member.kind
        }) {
            return Ok(false);
        }
        t.members.push(member.clone());
        Ok(true)
    }

    async fn remove_member(
        &self,
        project_id: Uuid,
        kind: MemberKind,
        user_id: Uuid,
    ) -> PortalResult<bool> {
        let mut t = self.tables.write().await;
        let before = t.members.len();
        t.members
            .retain(|m| !(m.project_id == project_id && m.user_id == user_id && m.kind == kind));
        Ok(t.members.len() < before)
    }

    async fn project_members(&self, project_id: Uuid) -> PortalResult<Vec<ProjectMember>> {
        let t = self.tables.read().await;
        Ok(t.members
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect())
    }

    // ── Checklists ──

    async fn checklist(
        &self,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<ChecklistItem>> {
        let t = self.tables.read().await;
        let rows = t
            .checklist
            .values()
            .filter(|i| {
                i.project_id == project_id && phase_number.is_none_or(|p| i.phase_number == p)
            })
            .cloned()
            .collect();
        Ok(sorted_by(rows, |i: &ChecklistItem| (i.phase_number, i.sort_order)))
    }

    async fn quality_checklist(
        &self,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<QualityChecklistItem>> {
        let t = self.tables.read().await;
        let rows = t
            .quality
            .values()
            .filter(|i| {
                i.project_id == project_id && phase_number.is_none_or(|p| i.phase_number == p)
            })
            .cloned()
            .collect();
        Ok(sorted_by(rows, |i: &QualityChecklistItem| {
            (i.phase_number, i.sort_order)
        }))
    }

    async fn get_checklist_item(&self, item_id: Uuid) -> PortalResult<Option<ChecklistItem>> {
        Ok(self.tables.read().await.checklist.get(&item_id).cloned())
    }

    async fn get_quality_item(&self, item_id: Uuid) -> PortalResult<Option<QualityChecklistItem>> {
        Ok(self.tables.read().await.quality.get(&item_id).cloned())
    }

    async fn insert_checklist_item(&self, item: &ChecklistItem) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        t.checklist.insert(item.item_id, item.clone());
        Ok(())
    }

    async fn toggle_checklist_item(
        &self,
        item_id: Uuid,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> PortalResult<Option<ChecklistItem>> {
        let mut t = self.tables.write().await;
        Ok(t.checklist.get_mut(&item_id).map(|item| {
            item.toggle(by, at);
            item.clone()
        }))
    }

    async fn toggle_quality_item(
        &self,
        item_id: Uuid,
        by: Uuid,
        at: DateTime<Utc>,
        notes: Option<String>,
    ) -> PortalResult<Option<QualityChecklistItem>> {
        let mut t = self.tables.write().await;
        Ok(t.quality.get_mut(&item_id).map(|item| {
            item.toggle(by, at, notes);
            item.clone()
        }))
    }

    // ── Documents ──

    async fn insert_document(&self, document: &Document) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        if t.documents.values().any(|d| {
            d.project_id == document.project_id
                && d.phase_number == document.phase_number
                && d.document_key == document.document_key
                && d.version == document.version
        }) {
            return Err(PortalError::conflict(format!(
                "version {} of {} already exists",
                document.version, document.document_key
            )));
        }
        t.documents.insert(document.document_id, document.clone());
        Ok(())
    }

    async fn get_document(&self, document_id: Uuid) -> PortalResult<Option<Document>> {
        Ok(self.tables.read().await.documents.get(&document_id).cloned())
    }

    async fn latest_document(
        &self,
        project_id: Uuid,
        phase_number: i32,
        document_key: &str,
    ) -> PortalResult<Option<Document>> {
        let t = self.tables.read().await;
        Ok(t.documents
            .values()
            .filter(|d| {
                d.project_id == project_id
                    && d.phase_number == phase_number
                    && d.document_key == document_key
            })
            .max_by_key(|d| d.version)
            .cloned())
    }

    async fn documents(
        &self,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<Document>> {
        let t = self.tables.read().await;
        let rows = t
            .documents
            .values()
            .filter(|d| {
                d.project_id == project_id && phase_number.is_none_or(|p| d.phase_number == p)
            })
            .cloned()
            .collect();
        Ok(sorted_by(rows, |d: &Document| {
            (d.phase_number, d.document_key.clone(), d.version)
        }))
    }

    async fn pending_documents(&self) -> PortalResult<Vec<Document>> {
        let t = self.tables.read().await;
        let rows = t
            .documents
            .values()
            .filter(|d| d.is_pending() && !t.has_newer_version(d))
            .cloned()
            .collect();
        Ok(sorted_by(rows, |d: &Document| d.uploaded_at))
    }

    async fn review_document(
        &self,
        update: &DocumentReviewUpdate,
    ) -> PortalResult<Option<Document>> {
        let mut t = self.tables.write().await;
        let Some(current) = t.documents.get(&update.document_id) else {
            return Err(PortalError::not_found("document", update.document_id));
        };
        if !current.is_pending() || t.has_newer_version(current) {
            return Ok(None);
        }
        let Some(document) = t.documents.get_mut(&update.document_id) else {
            return Ok(None);
        };
        document.status = update.outcome.status();
        document.reviewed_by = Some(update.reviewed_by);
        document.reviewed_at = Some(update.reviewed_at);
        document.review_notes = update.notes.clone();
        Ok(Some(document.clone()))
    }

    // ── Phase templates ──

    async fn insert_phase_template(&self, template: &PhaseTemplate) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        for existing in t.templates.values_mut().filter(|p| {
            p.phase_number == template.phase_number && p.document_key == template.document_key
        }) {
            existing.is_active = false;
        }
        t.templates.insert(template.template_id, template.clone());
        Ok(())
    }

    async fn get_phase_template(&self, template_id: Uuid) -> PortalResult<Option<PhaseTemplate>> {
        Ok(self.tables.read().await.templates.get(&template_id).cloned())
    }

    async fn list_phase_templates(
        &self,
        phase_number: Option<i32>,
        active_only: bool,
    ) -> PortalResult<Vec<PhaseTemplate>> {
        let t = self.tables.read().await;
        let rows = t
            .templates
            .values()
            .filter(|p| {
                phase_number.is_none_or(|n| p.phase_number == n) && (!active_only || p.is_active)
            })
            .cloned()
            .collect();
        Ok(sorted_by(rows, |p: &PhaseTemplate| {
            (
                p.phase_number,
                p.document_key.clone(),
                std::cmp::Reverse(p.uploaded_at),
            )
        }))
    }

    // ── Notifications ──

    async fn insert_notification(&self, notification: &Notification) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        t.notifications
            .insert(notification.notification_id, notification.clone());
        Ok(())
    }

    async fn mark_email_sent(&self, notification_id: Uuid, at: DateTime<Utc>) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        if let Some(n) = t.notifications.get_mut(&notification_id) {
            n.email_sent = true;
            n.email_sent_at = Some(at);
        }
        Ok(())
    }

    async fn get_notification(&self, notification_id: Uuid) -> PortalResult<Option<Notification>> {
        Ok(self
            .tables
            .read()
            .await
            .notifications
            .get(&notification_id)
            .cloned())
    }

    async fn list_notifications(&self, user_id: Uuid, limit: i64) -> PortalResult<Vec<Notification>> {
        let t = self.tables.read().await;
        let rows = t
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        let mut rows = sorted_by(rows, |n: &Notification| n.created_at);
        rows.reverse();
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> PortalResult<bool> {
        let mut t = self.tables.write().await;
        match t.notifications.get_mut(&notification_id) {
            Some(n) if n.user_id == user_id => {
                if !n.is_read {
                    n.is_read = true;
                    n.read_at = Some(at);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> PortalResult<u64> {
        let mut t = self.tables.write().await;
        let mut count = 0;
        for n in t
            .notifications
            .values_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            n.read_at = Some(at);
            count += 1;
        }
        Ok(count)
    }

    async fn unread_count(&self, user_id: Uuid) -> PortalResult<i64> {
        let t = self.tables.read().await;
        Ok(t.notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    // ── Collaboration ──

    async fn insert_chat_message(&self, message: &ChatMessage) -> PortalResult<()> {
        self.tables.write().await.chat.push(message.clone());
        Ok(())
    }

    async fn chat_messages(
        &self,
        project_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> PortalResult<Vec<ChatMessage>> {
        let t = self.tables.read().await;
        Ok(t.chat
            .iter()
            .filter(|m| m.project_id == project_id && since.is_none_or(|s| m.sent_at > s))
            .cloned()
            .collect())
    }

    async fn insert_announcement(&self, announcement: &Announcement) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        t.announcements
            .insert(announcement.announcement_id, announcement.clone());
        Ok(())
    }

    async fn list_announcements(&self) -> PortalResult<Vec<Announcement>> {
        let t = self.tables.read().await;
        let rows = t.announcements.values().cloned().collect();
        let mut rows = sorted_by(rows, |a: &Announcement| a.created_at);
        rows.reverse();
        Ok(rows)
    }

    async fn deactivate_announcement(&self, announcement_id: Uuid) -> PortalResult<bool> {
        let mut t = self.tables.write().await;
        match t.announcements.get_mut(&announcement_id) {
            Some(a) if a.is_active => {
                a.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ── CPD and recertification ──

    async fn insert_cpd_log(&self, log: &CpdLog) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&log.assessor_id) {
            return Err(PortalError::not_found("user", log.assessor_id));
        }
        t.cpd_logs.insert(log.cpd_log_id, log.clone());
        Ok(())
    }

    async fn get_cpd_log(&self, cpd_log_id: Uuid) -> PortalResult<Option<CpdLog>> {
        Ok(self.tables.read().await.cpd_logs.get(&cpd_log_id).cloned())
    }

    async fn list_cpd_logs(
        &self,
        assessor_id: Option<Uuid>,
        status: Option<CpdStatus>,
    ) -> PortalResult<Vec<CpdLog>> {
        let t = self.tables.read().await;
        let rows = t
            .cpd_logs
            .values()
            .filter(|l| {
                assessor_id.is_none_or(|a| l.assessor_id == a)
                    && status.is_none_or(|s| l.status == s)
            })
            .cloned()
            .collect();
        Ok(sorted_by(rows, |l: &CpdLog| l.submitted_at))
    }

    async fn review_cpd_log(&self, update: &CpdReviewUpdate) -> PortalResult<Option<CpdLog>> {
        let mut t = self.tables.write().await;
        let Some(log) = t.cpd_logs.get_mut(&update.cpd_log_id) else {
            return Err(PortalError::not_found("cpd_log", update.cpd_log_id));
        };
        if log.status != CpdStatus::Pending {
            return Ok(None);
        }
        log.status = if update.approve {
            CpdStatus::Approved
        } else {
            CpdStatus::Rejected
        };
        log.reviewed_by = Some(update.reviewed_by);
        log.reviewed_at = Some(update.reviewed_at);
        log.review_notes = update.notes.clone();
        let reviewed = log.clone();

        if update.approve {
            if let Some(record) = update
                .credit_record_id
                .and_then(|id| t.recertifications.get_mut(&id))
                .filter(|r| r.status == CycleStatus::Active)
            {
                record.accumulated_hours += reviewed.hours;
            }
        }
        Ok(Some(reviewed))
    }

    async fn insert_recertification(&self, record: &RecertificationRecord) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        if record.status == CycleStatus::Active
            && t.recertifications
                .values()
                .any(|r| r.assessor_id == record.assessor_id && r.status == CycleStatus::Active)
        {
            return Err(PortalError::conflict(format!(
                "assessor {} already has an active recertification cycle",
                record.assessor_id
            )));
        }
        t.recertifications.insert(record.record_id, record.clone());
        Ok(())
    }

    async fn get_recertification(
        &self,
        record_id: Uuid,
    ) -> PortalResult<Option<RecertificationRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .recertifications
            .get(&record_id)
            .cloned())
    }

    async fn active_recertification(
        &self,
        assessor_id: Uuid,
    ) -> PortalResult<Option<RecertificationRecord>> {
        let t = self.tables.read().await;
        Ok(t.recertifications
            .values()
            .find(|r| r.assessor_id == assessor_id && r.status == CycleStatus::Active)
            .cloned())
    }

    async fn list_recertifications(
        &self,
        status: Option<CycleStatus>,
    ) -> PortalResult<Vec<RecertificationRecord>> {
        let t = self.tables.read().await;
        let rows = t
            .recertifications
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        Ok(sorted_by(rows, |r: &RecertificationRecord| r.cycle_end))
    }

    async fn close_recertification(
        &self,
        record_id: Uuid,
        status: CycleStatus,
        at: DateTime<Utc>,
    ) -> PortalResult<Option<RecertificationRecord>> {
        let mut t = self.tables.write().await;
        match t.recertifications.get_mut(&record_id) {
            Some(r) if r.status == CycleStatus::Active => {
                r.status = status;
                r.closed_at = Some(at);
                Ok(Some(r.clone()))
            }
            Some(_) => Ok(None),
            None => Err(PortalError::not_found("recertification_record", record_id)),
        }
    }

    async fn renew_certification(
        &self,
        renewal: &CertificationRenewal,
    ) -> PortalResult<Option<RecertificationRecord>> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&renewal.assessor_id) {
            return Err(PortalError::not_found("user", renewal.assessor_id));
        }
        match t.recertifications.get(&renewal.closing_record_id) {
            Some(r) if r.status == CycleStatus::Active => {}
            Some(_) => return Ok(None),
            None => {
                return Err(PortalError::not_found(
                    "recertification_record",
                    renewal.closing_record_id,
                ))
            }
        }

        let closed = t
            .recertifications
            .get_mut(&renewal.closing_record_id)
            .map(|r| {
                r.status = CycleStatus::Completed;
                r.closed_at = Some(renewal.closed_at);
                r.clone()
            });
        if let Some(user) = t.users.get_mut(&renewal.assessor_id) {
            user.certification_date = Some(renewal.certification_date);
            user.recertification_due = Some(renewal.recertification_due);
        }
        t.recertifications
            .insert(renewal.next.record_id, renewal.next.clone());
        Ok(closed)
    }

    async fn assessors_with_recertification_due(&self, due: NaiveDate) -> PortalResult<Vec<User>> {
        let t = self.tables.read().await;
        Ok(t.users
            .values()
            .filter(|u| {
                u.is_active
                    && u.role == Role::GlabAssessor
                    && u.recertification_due == Some(due)
            })
            .cloned()
            .collect())
    }

    async fn records_short_of_hours_ending(
        &self,
        end: NaiveDate,
    ) -> PortalResult<Vec<RecertificationRecord>> {
        let t = self.tables.read().await;
        Ok(t.recertifications
            .values()
            .filter(|r| {
                r.status == CycleStatus::Active && r.cycle_end == end && !r.has_sufficient_hours()
            })
            .cloned()
            .collect())
    }

    async fn records_to_lapse(&self, today: NaiveDate) -> PortalResult<Vec<RecertificationRecord>> {
        let t = self.tables.read().await;
        Ok(t.recertifications
            .values()
            .filter(|r| r.should_lapse(today))
            .cloned()
            .collect())
    }

    // ── Reminder ledger ──

    async fn claim_reminder(
        &self,
        key: &ReminderKey,
        due_date: NaiveDate,
        at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> PortalResult<bool> {
        let mut t = self.tables.write().await;
        match t.reminders.get_mut(key) {
            Some(row) if row.sent => Ok(false),
            Some(row) if row.claimed_at.is_some_and(|c| c >= stale_before) => Ok(false),
            Some(row) => {
                row.claimed_at = Some(at);
                row.due_date = due_date;
                Ok(true)
            }
            None => {
                t.reminders.insert(
                    *key,
                    ScheduledReminder {
                        reminder_id: Uuid::new_v4(),
                        reminder_type: key.reminder_type,
                        target_type: key.target_type,
                        target_id: key.target_id,
                        due_date,
                        days_before: key.days_before,
                        sent: false,
                        sent_at: None,
                        claimed_at: Some(at),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn mark_reminder_sent(&self, key: &ReminderKey, at: DateTime<Utc>) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        let row = t
            .reminders
            .get_mut(key)
            .ok_or_else(|| PortalError::not_found("scheduled_reminder", key))?;
        row.sent = true;
        row.sent_at = Some(at);
        row.claimed_at = None;
        Ok(())
    }

    async fn release_reminder(&self, key: &ReminderKey) -> PortalResult<()> {
        let mut t = self.tables.write().await;
        if let Some(row) = t.reminders.get_mut(key).filter(|r| !r.sent) {
            row.claimed_at = None;
        }
        Ok(())
    }

    async fn get_reminder(&self, key: &ReminderKey) -> PortalResult<Option<ScheduledReminder>> {
        Ok(self.tables.read().await.reminders.get(key).cloned())
    }

    async fn list_reminders(&self) -> PortalResult<Vec<ScheduledReminder>> {
        let t = self.tables.read().await;
        let rows = t.reminders.values().cloned().collect();
        Ok(sorted_by(rows, |r: &ScheduledReminder| (r.due_date, r.days_before)))
    }
}
