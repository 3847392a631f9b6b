//! Postgres-backed `PortalStore`
//!
//! Runtime-checked `sqlx` queries against the schema in
//! `migrations/0001_portal_schema.sql`. Guarded transitions are single
//! statements with a `WHERE` guard and `RETURNING`, so a lost race shows up as
//! zero rows rather than a silent overwrite.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    CertificationRenewal, CpdReviewUpdate, DocumentReviewUpdate, PortalStore, ProjectScope,
    UserQuery,
};
use crate::error::{PortalError, PortalResult};
use crate::models::*;

const USER_COLUMNS: &str = "user_id, username, email, full_name, role, glab_id, client_id, \
     assessor_code, certification_date, recertification_due, email_notifications, is_active, \
     created_at, created_by";

const GLAB_COLUMNS: &str = "glab_id, name, license_number, country, address, contact_email, \
     contact_phone, license_type, license_start_date, license_expiry_date, last_payment_date, \
     next_payment_due, status, created_at, created_by";

const CLIENT_COLUMNS: &str = "client_id, name, country, registered_address, industry_sector, \
     total_employees, number_of_sites, primary_contact_name, primary_contact_email, \
     primary_contact_phone, glab_id, created_at, created_by";

const PROJECT_COLUMNS: &str = "project_id, reference_number, glab_id, client_id, \
     assessment_type, current_phase, gea_status, gea_notes, gea_reviewed_by, gea_reviewed_at, \
     client_fee, gea_fee, glab_revenue, initial_payment_received, initial_payment_date, \
     final_payment_received, final_payment_date, gea_fee_remitted, gea_fee_remitted_date, \
     created_at, created_by";

const PHASE_LOG_COLUMNS: &str =
    "log_id, project_id, from_phase, to_phase, action, performed_by, performed_at, notes";

const PHASE_REVIEW_COLUMNS: &str =
    "review_id, project_id, phase_number, outcome, reviewer_id, notes, reviewed_at";

const MEMBER_COLUMNS: &str = "project_id, user_id, kind, assigned_by, assigned_at";

const CHECKLIST_COLUMNS: &str = "item_id, project_id, phase_number, item_text, is_required, \
     is_custom, is_completed, completed_by, completed_at, sort_order";

const QUALITY_COLUMNS: &str = "item_id, project_id, phase_number, item_text, check_type, \
     is_checked, checked_by, checked_at, notes, document_id, sort_order";

const DOCUMENT_COLUMNS: &str = "document_id, project_id, phase_number, document_key, \
     document_name, version, parent_id, original_filename, stored_id, file_size, uploaded_by, \
     uploaded_at, status, reviewed_by, reviewed_at, review_notes";

const TEMPLATE_COLUMNS: &str = "template_id, phase_number, document_key, template_name, \
     original_filename, stored_id, file_size, uploaded_by, uploaded_at, is_active";

const NOTIFICATION_COLUMNS: &str = "notification_id, user_id, notification_type, title, \
     message, link_type, link_id, is_read, read_at, email_sent, email_sent_at, created_at";

const CHAT_COLUMNS: &str = "message_id, project_id, sender_id, body, sent_at";

const ANNOUNCEMENT_COLUMNS: &str = "announcement_id, title, message, priority, target_glab_id, \
     created_by, created_at, expires_at, is_active";

const CPD_COLUMNS: &str = "cpd_log_id, assessor_id, activity_type, activity_title, \
     activity_date, hours, description, evidence_filename, evidence_stored_id, status, \
     reviewed_by, reviewed_at, review_notes, submitted_at";

const RECERT_COLUMNS: &str = "record_id, assessor_id, cycle_start, cycle_end, required_hours, \
     accumulated_hours, status, closed_at";

const REMINDER_COLUMNS: &str = "reminder_id, reminder_type, target_type, target_id, due_date, \
     days_before, sent, sent_at, claimed_at";

/// Store over a Postgres connection pool
#[derive(Clone, Debug)]
pub struct PgPortalStore {
    pool: PgPool,
}

impl PgPortalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn project_exists(&self, project_id: Uuid) -> PortalResult<bool> {
        let found: Option<Uuid> =
            sqlx::query_scalar("SELECT project_id FROM projects WHERE project_id = $1")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl PortalStore for PgPortalStore {
    // ── Users ──

    async fn insert_user(&self, user: &User) -> PortalResult<()> {
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        sqlx::query(&sql)
            .bind(user.user_id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(user.role)
            .bind(user.glab_id)
            .bind(user.client_id)
            .bind(&user.assessor_code)
            .bind(user.certification_date)
            .bind(user.recertification_due)
            .bind(user.email_notifications)
            .bind(user.is_active)
            .bind(user.created_at)
            .bind(user.created_by)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> PortalResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> PortalResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_user(&self, user: &User) -> PortalResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = $2, email = $3, full_name = $4, role = $5, glab_id = $6,
                client_id = $7, assessor_code = $8, certification_date = $9,
                recertification_due = $10, email_notifications = $11, is_active = $12
            WHERE user_id = $1
            "#,
        )
        .bind(user.user_id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role)
        .bind(user.glab_id)
        .bind(user.client_id)
        .bind(&user.assessor_code)
        .bind(user.certification_date)
        .bind(user.recertification_due)
        .bind(user.email_notifications)
        .bind(user.is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PortalError::not_found("user", user.user_id));
        }
        Ok(())
    }

    async fn list_users(&self, query: &UserQuery) -> PortalResult<Vec<User>> {
        let roles: Vec<String> = query.roles.iter().map(|r| r.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE (cardinality($1::text[]) = 0 OR role = ANY($1)) \
               AND ($2::uuid IS NULL OR glab_id = $2) \
               AND (NOT $3 OR is_active) \
             ORDER BY username"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(roles)
            .bind(query.glab_id)
            .bind(query.active_only)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn set_user_active(&self, user_id: Uuid, active: bool) -> PortalResult<Option<User>> {
        let sql =
            format!("UPDATE users SET is_active = $2 WHERE user_id = $1 RETURNING {USER_COLUMNS}");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_email_notifications(
        &self,
        user_id: Uuid,
        enabled: bool,
    ) -> PortalResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET email_notifications = $2 WHERE user_id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(enabled)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ── GLABs ──

    async fn insert_glab(&self, glab: &Glab) -> PortalResult<()> {
        let sql = format!(
            "INSERT INTO glabs ({GLAB_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        );
        sqlx::query(&sql)
            .bind(glab.glab_id)
            .bind(&glab.name)
            .bind(&glab.license_number)
            .bind(&glab.country)
            .bind(&glab.address)
            .bind(&glab.contact_email)
            .bind(&glab.contact_phone)
            .bind(glab.license_type)
            .bind(glab.license_start_date)
            .bind(glab.license_expiry_date)
            .bind(glab.last_payment_date)
            .bind(glab.next_payment_due)
            .bind(glab.status)
            .bind(glab.created_at)
            .bind(glab.created_by)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_glab(&self, glab_id: Uuid) -> PortalResult<Option<Glab>> {
        let sql = format!("SELECT {GLAB_COLUMNS} FROM glabs WHERE glab_id = $1");
        Ok(sqlx::query_as::<_, Glab>(&sql)
            .bind(glab_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_glab(&self, glab: &Glab) -> PortalResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE glabs SET
                name = $2, license_number = $3, country = $4, address = $5,
                contact_email = $6, contact_phone = $7, license_type = $8,
                license_start_date = $9, license_expiry_date = $10,
                last_payment_date = $11, next_payment_due = $12, status = $13
            WHERE glab_id = $1
            "#,
        )
        .bind(glab.glab_id)
        .bind(&glab.name)
        .bind(&glab.license_number)
        .bind(&glab.country)
        .bind(&glab.address)
        .bind(&glab.contact_email)
        .bind(&glab.contact_phone)
        .bind(glab.license_type)
        .bind(glab.license_start_date)
        .bind(glab.license_expiry_date)
        .bind(glab.last_payment_date)
        .bind(glab.next_payment_due)
        .bind(glab.status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PortalError::not_found("glab", glab.glab_id));
        }
        Ok(())
    }

    async fn list_glabs(&self) -> PortalResult<Vec<Glab>> {
        let sql = format!("SELECT {GLAB_COLUMNS} FROM glabs ORDER BY name");
        Ok(sqlx::query_as::<_, Glab>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn glabs_with_payment_due(&self, due: NaiveDate) -> PortalResult<Vec<Glab>> {
        let sql = format!(
            "SELECT {GLAB_COLUMNS} FROM glabs WHERE status = 'active' AND next_payment_due = $1"
        );
        Ok(sqlx::query_as::<_, Glab>(&sql)
            .bind(due)
            .fetch_all(&self.pool)
            .await?)
    }

    // ── Clients ──

    async fn insert_client(&self, client: &Client) -> PortalResult<()> {
        let sql = format!(
            "INSERT INTO clients ({CLIENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );
        sqlx::query(&sql)
            .bind(client.client_id)
            .bind(&client.name)
            .bind(&client.country)
            .bind(&client.registered_address)
            .bind(&client.industry_sector)
            .bind(client.total_employees)
            .bind(client.number_of_sites)
            .bind(&client.primary_contact_name)
            .bind(&client.primary_contact_email)
            .bind(&client.primary_contact_phone)
            .bind(client.glab_id)
            .bind(client.created_at)
            .bind(client.created_by)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_client(&self, client_id: Uuid) -> PortalResult<Option<Client>> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE client_id = $1");
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_clients(&self, glab_id: Option<Uuid>) -> PortalResult<Vec<Client>> {
        let sql = format!(
            "SELECT {CLIENT_COLUMNS} FROM clients \
             WHERE ($1::uuid IS NULL OR glab_id = $1) ORDER BY name"
        );
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(glab_id)
            .fetch_all(&self.pool)
            .await?)
    }

    // ── Projects ──

    async fn create_project(
        &self,
        project: &Project,
        checklist: &[ChecklistItem],
        quality_checklist: &[QualityChecklistItem],
        log: &PhaseLog,
    ) -> PortalResult<()> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO projects ({PROJECT_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
              $18, $19, $20, $21)"
        );
        sqlx::query(&sql)
            .bind(project.project_id)
            .bind(&project.reference_number)
            .bind(project.glab_id)
            .bind(project.client_id)
            .bind(project.assessment_type)
            .bind(project.current_phase)
            .bind(project.gea_status)
            .bind(&project.gea_notes)
            .bind(project.gea_reviewed_by)
            .bind(project.gea_reviewed_at)
            .bind(project.client_fee)
            .bind(project.gea_fee)
            .bind(project.glab_revenue)
            .bind(project.initial_payment_received)
            .bind(project.initial_payment_date)
            .bind(project.final_payment_received)
            .bind(project.final_payment_date)
            .bind(project.gea_fee_remitted)
            .bind(project.gea_fee_remitted_date)
            .bind(project.created_at)
            .bind(project.created_by)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO checklist_items ({CHECKLIST_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        for item in checklist {
            sqlx::query(&sql)
                .bind(item.item_id)
                .bind(item.project_id)
                .bind(item.phase_number)
                .bind(&item.item_text)
                .bind(item.is_required)
                .bind(item.is_custom)
                .bind(item.is_completed)
                .bind(item.completed_by)
                .bind(item.completed_at)
                .bind(item.sort_order)
                .execute(&mut *tx)
                .await?;
        }

        let sql = format!(
            "INSERT INTO quality_checklist_items ({QUALITY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );
        for item in quality_checklist {
            sqlx::query(&sql)
                .bind(item.item_id)
                .bind(item.project_id)
                .bind(item.phase_number)
                .bind(&item.item_text)
                .bind(item.check_type)
                .bind(item.is_checked)
                .bind(item.checked_by)
                .bind(item.checked_at)
                .bind(&item.notes)
                .bind(item.document_id)
                .bind(item.sort_order)
                .execute(&mut *tx)
                .await?;
        }

        insert_phase_log(&mut tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_project(&self, project_id: Uuid) -> PortalResult<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = $1");
        Ok(sqlx::query_as::<_, Project>(&sql)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_projects(&self, scope: ProjectScope) -> PortalResult<Vec<Project>> {
        let (filter, id) = match scope {
            ProjectScope::All => ("TRUE", None),
            ProjectScope::Glab(id) => ("glab_id = $1", Some(id)),
            ProjectScope::Client(id) => ("client_id = $1", Some(id)),
            ProjectScope::Member(id) => (
                "project_id IN (SELECT project_id FROM project_members WHERE user_id = $1)",
                Some(id),
            ),
        };
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE {filter} ORDER BY created_at DESC"
        );
        let query = sqlx::query_as::<_, Project>(&sql);
        let query = match id {
            Some(id) => query.bind(id),
            None => query,
        };
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn count_projects_for_glab_year(&self, glab_id: Uuid, year: i32) -> PortalResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM projects
            WHERE glab_id = $1 AND EXTRACT(YEAR FROM created_at)::int = $2
            "#,
        )
        .bind(glab_id)
        .bind(year)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn move_project_phase(
        &self,
        project_id: Uuid,
        expected_phase: i32,
        log: &PhaseLog,
    ) -> PortalResult<Option<Project>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE projects SET current_phase = $3, gea_status = 'pending', gea_notes = NULL, \
                 gea_reviewed_by = NULL, gea_reviewed_at = NULL \
             WHERE project_id = $1 AND current_phase = $2 \
             RETURNING {PROJECT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Project>(&sql)
            .bind(project_id)
            .bind(expected_phase)
            .bind(log.to_phase)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(project) = updated else {
            tx.rollback().await?;
            if !self.project_exists(project_id).await? {
                return Err(PortalError::not_found("project", project_id));
            }
            return Ok(None);
        };

        insert_phase_log(&mut tx, log).await?;
        tx.commit().await?;
        Ok(Some(project))
    }

    async fn record_payment(
        &self,
        project_id: Uuid,
        milestone: PaymentMilestone,
        paid_on: NaiveDate,
    ) -> PortalResult<Option<Project>> {
        let (flag, date) = match milestone {
            PaymentMilestone::Initial => ("initial_payment_received", "initial_payment_date"),
            PaymentMilestone::Final => ("final_payment_received", "final_payment_date"),
            PaymentMilestone::GeaFeeRemitted => ("gea_fee_remitted", "gea_fee_remitted_date"),
        };
        let sql = format!(
            "UPDATE projects SET {flag} = TRUE, {date} = $2 \
             WHERE project_id = $1 AND NOT {flag} \
             RETURNING {PROJECT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Project>(&sql)
            .bind(project_id)
            .bind(paid_on)
            .fetch_optional(&self.pool)
            .await?;

        if updated.is_none() && !self.project_exists(project_id).await? {
            return Err(PortalError::not_found("project", project_id));
        }
        Ok(updated)
    }

    async fn phase_history(&self, project_id: Uuid) -> PortalResult<Vec<PhaseLog>> {
        let sql = format!(
            "SELECT {PHASE_LOG_COLUMNS} FROM phase_logs WHERE project_id = $1 \
             ORDER BY performed_at"
        );
        Ok(sqlx::query_as::<_, PhaseLog>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?)
    }

    // ── Phase reviews ──

    async fn record_phase_review(&self, review: &PhaseReview) -> PortalResult<Option<Project>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE projects SET gea_status = $3, gea_notes = $4, gea_reviewed_by = $5, \
                 gea_reviewed_at = $6 \
             WHERE project_id = $1 AND current_phase = $2 \
             RETURNING {PROJECT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Project>(&sql)
            .bind(review.project_id)
            .bind(review.phase_number)
            .bind(review.outcome.status())
            .bind(&review.notes)
            .bind(review.reviewer_id)
            .bind(review.reviewed_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(project) = updated else {
            tx.rollback().await?;
            if !self.project_exists(review.project_id).await? {
                return Err(PortalError::not_found("project", review.project_id));
            }
            return Ok(None);
        };

        let sql = format!(
            "INSERT INTO phase_reviews ({PHASE_REVIEW_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        );
        sqlx::query(&sql)
            .bind(review.review_id)
            .bind(review.project_id)
            .bind(review.phase_number)
            .bind(review.outcome)
            .bind(review.reviewer_id)
            .bind(&review.notes)
            .bind(review.reviewed_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(project))
    }

    async fn latest_phase_review(
        &self,
        project_id: Uuid,
        phase_number: i32,
    ) -> PortalResult<Option<PhaseReview>> {
        let sql = format!(
            "SELECT {PHASE_REVIEW_COLUMNS} FROM phase_reviews \
             WHERE project_id = $1 AND phase_number = $2 \
             ORDER BY reviewed_at DESC, seq DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, PhaseReview>(&sql)
            .bind(project_id)
            .bind(phase_number)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn phase_reviews(&self, project_id: Uuid) -> PortalResult<Vec<PhaseReview>> {
        let sql = format!(
            "SELECT {PHASE_REVIEW_COLUMNS} FROM phase_reviews WHERE project_id = $1 ORDER BY seq"
        );
        Ok(sqlx::query_as::<_, PhaseReview>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?)
    }

    // ── Membership ──

    async fn add_member(&self, member: &ProjectMember) -> PortalResult<bool> {
        let sql = format!(
            "INSERT INTO project_members ({MEMBER_COLUMNS}) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (project_id, user_id, kind) DO NOTHING"
        );
        let result = sqlx::query(&sql)
            .bind(member.project_id)
            .bind(member.user_id)
            .bind(member.kind)
            .bind(member.assigned_by)
            .bind(member.assigned_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_member(
        &self,
        project_id: Uuid,
        kind: MemberKind,
        user_id: Uuid,
    ) -> PortalResult<bool> {
        let result = sqlx::query(
            "DELETE FROM project_members WHERE project_id = $1 AND kind = $2 AND user_id = $3",
        )
        .bind(project_id)
        .bind(kind)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn project_members(&self, project_id: Uuid) -> PortalResult<Vec<ProjectMember>> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM project_members WHERE project_id = $1 \
             ORDER BY assigned_at"
        );
        Ok(sqlx::query_as::<_, ProjectMember>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?)
    }

    // ── Checklists ──

    async fn checklist(
        &self,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<ChecklistItem>> {
        let sql = format!(
            "SELECT {CHECKLIST_COLUMNS} FROM checklist_items \
             WHERE project_id = $1 AND ($2::int IS NULL OR phase_number = $2) \
             ORDER BY phase_number, sort_order"
        );
        Ok(sqlx::query_as::<_, ChecklistItem>(&sql)
            .bind(project_id)
            .bind(phase_number)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn quality_checklist(
        &self,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<QualityChecklistItem>> {
        let sql = format!(
            "SELECT {QUALITY_COLUMNS} FROM quality_checklist_items \
             WHERE project_id = $1 AND ($2::int IS NULL OR phase_number = $2) \
             ORDER BY phase_number, sort_order"
        );
        Ok(sqlx::query_as::<_, QualityChecklistItem>(&sql)
            .bind(project_id)
            .bind(phase_number)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_checklist_item(&self, item_id: Uuid) -> PortalResult<Option<ChecklistItem>> {
        let sql = format!("SELECT {CHECKLIST_COLUMNS} FROM checklist_items WHERE item_id = $1");
        Ok(sqlx::query_as::<_, ChecklistItem>(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_quality_item(&self, item_id: Uuid) -> PortalResult<Option<QualityChecklistItem>> {
        let sql =
            format!("SELECT {QUALITY_COLUMNS} FROM quality_checklist_items WHERE item_id = $1");
        Ok(sqlx::query_as::<_, QualityChecklistItem>(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_checklist_item(&self, item: &ChecklistItem) -> PortalResult<()> {
        let sql = format!(
            "INSERT INTO checklist_items ({CHECKLIST_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        sqlx::query(&sql)
            .bind(item.item_id)
            .bind(item.project_id)
            .bind(item.phase_number)
            .bind(&item.item_text)
            .bind(item.is_required)
            .bind(item.is_custom)
            .bind(item.is_completed)
            .bind(item.completed_by)
            .bind(item.completed_at)
            .bind(item.sort_order)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn toggle_checklist_item(
        &self,
        item_id: Uuid,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> PortalResult<Option<ChecklistItem>> {
        // Right-hand sides see the pre-update row
        let sql = format!(
            "UPDATE checklist_items SET \
                 is_completed = NOT is_completed, \
                 completed_by = CASE WHEN is_completed THEN NULL ELSE $2 END, \
                 completed_at = CASE WHEN is_completed THEN NULL ELSE $3 END \
             WHERE item_id = $1 \
             RETURNING {CHECKLIST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, ChecklistItem>(&sql)
            .bind(item_id)
            .bind(by)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn toggle_quality_item(
        &self,
        item_id: Uuid,
        by: Uuid,
        at: DateTime<Utc>,
        notes: Option<String>,
    ) -> PortalResult<Option<QualityChecklistItem>> {
        let sql = format!(
            "UPDATE quality_checklist_items SET \
                 is_checked = NOT is_checked, \
                 checked_by = CASE WHEN is_checked THEN NULL ELSE $2 END, \
                 checked_at = CASE WHEN is_checked THEN NULL ELSE $3 END, \
                 notes = CASE WHEN NOT is_checked AND $4::text IS NOT NULL THEN $4 ELSE notes END \
             WHERE item_id = $1 \
             RETURNING {QUALITY_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, QualityChecklistItem>(&sql)
            .bind(item_id)
            .bind(by)
            .bind(at)
            .bind(notes)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ── Documents ──

    async fn insert_document(&self, document: &Document) -> PortalResult<()> {
        let sql = format!(
            "INSERT INTO documents ({DOCUMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        );
        sqlx::query(&sql)
            .bind(document.document_id)
            .bind(document.project_id)
            .bind(document.phase_number)
            .bind(&document.document_key)
            .bind(&document.document_name)
            .bind(document.version)
            .bind(document.parent_id)
            .bind(&document.original_filename)
            .bind(&document.stored_id)
            .bind(document.file_size)
            .bind(document.uploaded_by)
            .bind(document.uploaded_at)
            .bind(document.status)
            .bind(document.reviewed_by)
            .bind(document.reviewed_at)
            .bind(&document.review_notes)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_document(&self, document_id: Uuid) -> PortalResult<Option<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_id = $1");
        Ok(sqlx::query_as::<_, Document>(&sql)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn latest_document(
        &self,
        project_id: Uuid,
        phase_number: i32,
        document_key: &str,
    ) -> PortalResult<Option<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE project_id = $1 AND phase_number = $2 AND document_key = $3 \
             ORDER BY version DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, Document>(&sql)
            .bind(project_id)
            .bind(phase_number)
            .bind(document_key)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn documents(
        &self,
        project_id: Uuid,
        phase_number: Option<i32>,
    ) -> PortalResult<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE project_id = $1 AND ($2::int IS NULL OR phase_number = $2) \
             ORDER BY phase_number, document_key, version"
        );
        Ok(sqlx::query_as::<_, Document>(&sql)
            .bind(project_id)
            .bind(phase_number)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn pending_documents(&self) -> PortalResult<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d \
             WHERE d.status = 'pending' \
               AND NOT EXISTS (SELECT 1 FROM documents n WHERE n.parent_id = d.document_id) \
             ORDER BY d.uploaded_at"
        );
        Ok(sqlx::query_as::<_, Document>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn review_document(
        &self,
        update: &DocumentReviewUpdate,
    ) -> PortalResult<Option<Document>> {
        let sql = format!(
            "UPDATE documents d SET status = $2, reviewed_by = $3, reviewed_at = $4, \
                 review_notes = $5 \
             WHERE d.document_id = $1 AND d.status = 'pending' \
               AND NOT EXISTS (SELECT 1 FROM documents n WHERE n.parent_id = d.document_id) \
             RETURNING {DOCUMENT_COLUMNS}"
        );
        let reviewed = sqlx::query_as::<_, Document>(&sql)
            .bind(update.document_id)
            .bind(update.outcome.status())
            .bind(update.reviewed_by)
            .bind(update.reviewed_at)
            .bind(&update.notes)
            .fetch_optional(&self.pool)
            .await?;

        if reviewed.is_none() && self.get_document(update.document_id).await?.is_none() {
            return Err(PortalError::not_found("document", update.document_id));
        }
        Ok(reviewed)
    }

    // ── Phase templates ──

    async fn insert_phase_template(&self, template: &PhaseTemplate) -> PortalResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE phase_templates SET is_active = FALSE \
             WHERE phase_number = $1 AND document_key = $2 AND is_active",
        )
        .bind(template.phase_number)
        .bind(&template.document_key)
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            "INSERT INTO phase_templates ({TEMPLATE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        sqlx::query(&sql)
            .bind(template.template_id)
            .bind(template.phase_number)
            .bind(&template.document_key)
            .bind(&template.template_name)
            .bind(&template.original_filename)
            .bind(&template.stored_id)
            .bind(template.file_size)
            .bind(template.uploaded_by)
            .bind(template.uploaded_at)
            .bind(template.is_active)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_phase_template(&self, template_id: Uuid) -> PortalResult<Option<PhaseTemplate>> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM phase_templates WHERE template_id = $1");
        Ok(sqlx::query_as::<_, PhaseTemplate>(&sql)
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_phase_templates(
        &self,
        phase_number: Option<i32>,
        active_only: bool,
    ) -> PortalResult<Vec<PhaseTemplate>> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM phase_templates \
             WHERE ($1::int IS NULL OR phase_number = $1) AND (NOT $2 OR is_active) \
             ORDER BY phase_number, document_key, uploaded_at DESC"
        );
        Ok(sqlx::query_as::<_, PhaseTemplate>(&sql)
            .bind(phase_number)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?)
    }

    // ── Notifications ──

    async fn insert_notification(&self, notification: &Notification) -> PortalResult<()> {
        let sql = format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        sqlx::query(&sql)
            .bind(notification.notification_id)
            .bind(notification.user_id)
            .bind(notification.notification_type)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.link_type)
            .bind(notification.link_id)
            .bind(notification.is_read)
            .bind(notification.read_at)
            .bind(notification.email_sent)
            .bind(notification.email_sent_at)
            .bind(notification.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_email_sent(&self, notification_id: Uuid, at: DateTime<Utc>) -> PortalResult<()> {
        sqlx::query(
            "UPDATE notifications SET email_sent = TRUE, email_sent_at = $2 \
             WHERE notification_id = $1",
        )
        .bind(notification_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_notification(&self, notification_id: Uuid) -> PortalResult<Option<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE notification_id = $1"
        );
        Ok(sqlx::query_as::<_, Notification>(&sql)
            .bind(notification_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_notifications(&self, user_id: Uuid, limit: i64) -> PortalResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        Ok(sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> PortalResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, $3) \
             WHERE notification_id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> PortalResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = $2 \
             WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn unread_count(&self, user_id: Uuid) -> PortalResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    // ── Collaboration ──

    async fn insert_chat_message(&self, message: &ChatMessage) -> PortalResult<()> {
        let sql = format!("INSERT INTO chat_messages ({CHAT_COLUMNS}) VALUES ($1, $2, $3, $4, $5)");
        sqlx::query(&sql)
            .bind(message.message_id)
            .bind(message.project_id)
            .bind(message.sender_id)
            .bind(&message.body)
            .bind(message.sent_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn chat_messages(
        &self,
        project_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> PortalResult<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chat_messages \
             WHERE project_id = $1 AND ($2::timestamptz IS NULL OR sent_at > $2) \
             ORDER BY sent_at"
        );
        Ok(sqlx::query_as::<_, ChatMessage>(&sql)
            .bind(project_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_announcement(&self, announcement: &Announcement) -> PortalResult<()> {
        let sql = format!(
            "INSERT INTO announcements ({ANNOUNCEMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );
        sqlx::query(&sql)
            .bind(announcement.announcement_id)
            .bind(&announcement.title)
            .bind(&announcement.message)
            .bind(announcement.priority)
            .bind(announcement.target_glab_id)
            .bind(announcement.created_by)
            .bind(announcement.created_at)
            .bind(announcement.expires_at)
            .bind(announcement.is_active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_announcements(&self) -> PortalResult<Vec<Announcement>> {
        let sql =
            format!("SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, Announcement>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn deactivate_announcement(&self, announcement_id: Uuid) -> PortalResult<bool> {
        let result = sqlx::query(
            "UPDATE announcements SET is_active = FALSE WHERE announcement_id = $1 AND is_active",
        )
        .bind(announcement_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── CPD and recertification ──

    async fn insert_cpd_log(&self, log: &CpdLog) -> PortalResult<()> {
        let sql = format!(
            "INSERT INTO cpd_logs ({CPD_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        sqlx::query(&sql)
            .bind(log.cpd_log_id)
            .bind(log.assessor_id)
            .bind(&log.activity_type)
            .bind(&log.activity_title)
            .bind(log.activity_date)
            .bind(log.hours)
            .bind(&log.description)
            .bind(&log.evidence_filename)
            .bind(&log.evidence_stored_id)
            .bind(log.status)
            .bind(log.reviewed_by)
            .bind(log.reviewed_at)
            .bind(&log.review_notes)
            .bind(log.submitted_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_cpd_log(&self, cpd_log_id: Uuid) -> PortalResult<Option<CpdLog>> {
        let sql = format!("SELECT {CPD_COLUMNS} FROM cpd_logs WHERE cpd_log_id = $1");
        Ok(sqlx::query_as::<_, CpdLog>(&sql)
            .bind(cpd_log_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_cpd_logs(
        &self,
        assessor_id: Option<Uuid>,
        status: Option<CpdStatus>,
    ) -> PortalResult<Vec<CpdLog>> {
        let sql = format!(
            "SELECT {CPD_COLUMNS} FROM cpd_logs \
             WHERE ($1::uuid IS NULL OR assessor_id = $1) \
               AND ($2::text IS NULL OR status = $2) \
             ORDER BY submitted_at"
        );
        Ok(sqlx::query_as::<_, CpdLog>(&sql)
            .bind(assessor_id)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn review_cpd_log(&self, update: &CpdReviewUpdate) -> PortalResult<Option<CpdLog>> {
        let status = if update.approve {
            CpdStatus::Approved
        } else {
            CpdStatus::Rejected
        };
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE cpd_logs SET status = $2, reviewed_by = $3, reviewed_at = $4, \
                 review_notes = $5 \
             WHERE cpd_log_id = $1 AND status = 'pending' \
             RETURNING {CPD_COLUMNS}"
        );
        let reviewed = sqlx::query_as::<_, CpdLog>(&sql)
            .bind(update.cpd_log_id)
            .bind(status)
            .bind(update.reviewed_by)
            .bind(update.reviewed_at)
            .bind(&update.notes)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(log) = reviewed else {
            tx.rollback().await?;
            if self.get_cpd_log(update.cpd_log_id).await?.is_none() {
                return Err(PortalError::not_found("cpd_log", update.cpd_log_id));
            }
            return Ok(None);
        };

        if let (true, Some(record_id)) = (update.approve, update.credit_record_id) {
            sqlx::query(
                "UPDATE recertification_records \
                 SET accumulated_hours = accumulated_hours + $2 \
                 WHERE record_id = $1 AND status = 'active'",
            )
            .bind(record_id)
            .bind(log.hours)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(log))
    }

    async fn insert_recertification(&self, record: &RecertificationRecord) -> PortalResult<()> {
        let sql = format!(
            "INSERT INTO recertification_records ({RECERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );
        sqlx::query(&sql)
            .bind(record.record_id)
            .bind(record.assessor_id)
            .bind(record.cycle_start)
            .bind(record.cycle_end)
            .bind(record.required_hours)
            .bind(record.accumulated_hours)
            .bind(record.status)
            .bind(record.closed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_recertification(
        &self,
        record_id: Uuid,
    ) -> PortalResult<Option<RecertificationRecord>> {
        let sql =
            format!("SELECT {RECERT_COLUMNS} FROM recertification_records WHERE record_id = $1");
        Ok(sqlx::query_as::<_, RecertificationRecord>(&sql)
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn active_recertification(
        &self,
        assessor_id: Uuid,
    ) -> PortalResult<Option<RecertificationRecord>> {
        let sql = format!(
            "SELECT {RECERT_COLUMNS} FROM recertification_records \
             WHERE assessor_id = $1 AND status = 'active'"
        );
        Ok(sqlx::query_as::<_, RecertificationRecord>(&sql)
            .bind(assessor_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_recertifications(
        &self,
        status: Option<CycleStatus>,
    ) -> PortalResult<Vec<RecertificationRecord>> {
        let sql = format!(
            "SELECT {RECERT_COLUMNS} FROM recertification_records \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY cycle_end"
        );
        Ok(sqlx::query_as::<_, RecertificationRecord>(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn close_recertification(
        &self,
        record_id: Uuid,
        status: CycleStatus,
        at: DateTime<Utc>,
    ) -> PortalResult<Option<RecertificationRecord>> {
        let sql = format!(
            "UPDATE recertification_records SET status = $2, closed_at = $3 \
             WHERE record_id = $1 AND status = 'active' \
             RETURNING {RECERT_COLUMNS}"
        );
        let closed = sqlx::query_as::<_, RecertificationRecord>(&sql)
            .bind(record_id)
            .bind(status)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        if closed.is_none() && self.get_recertification(record_id).await?.is_none() {
            return Err(PortalError::not_found("recertification_record", record_id));
        }
        Ok(closed)
    }

    async fn renew_certification(
        &self,
        renewal: &CertificationRenewal,
    ) -> PortalResult<Option<RecertificationRecord>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE recertification_records SET status = 'completed', closed_at = $2 \
             WHERE record_id = $1 AND status = 'active' \
             RETURNING {RECERT_COLUMNS}"
        );
        let closed = sqlx::query_as::<_, RecertificationRecord>(&sql)
            .bind(renewal.closing_record_id)
            .bind(renewal.closed_at)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(closed) = closed else {
            tx.rollback().await?;
            if self
                .get_recertification(renewal.closing_record_id)
                .await?
                .is_none()
            {
                return Err(PortalError::not_found(
                    "recertification_record",
                    renewal.closing_record_id,
                ));
            }
            return Ok(None);
        };

        let updated = sqlx::query(
            "UPDATE users SET certification_date = $2, recertification_due = $3 \
             WHERE user_id = $1",
        )
        .bind(renewal.assessor_id)
        .bind(renewal.certification_date)
        .bind(renewal.recertification_due)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(PortalError::not_found("user", renewal.assessor_id));
        }

        let next = &renewal.next;
        let sql = format!(
            "INSERT INTO recertification_records ({RECERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );
        sqlx::query(&sql)
            .bind(next.record_id)
            .bind(next.assessor_id)
            .bind(next.cycle_start)
            .bind(next.cycle_end)
            .bind(next.required_hours)
            .bind(next.accumulated_hours)
            .bind(next.status)
            .bind(next.closed_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(closed))
    }

    async fn assessors_with_recertification_due(&self, due: NaiveDate) -> PortalResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE role = 'glab_assessor' AND is_active AND recertification_due = $1"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(due)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn records_short_of_hours_ending(
        &self,
        end: NaiveDate,
    ) -> PortalResult<Vec<RecertificationRecord>> {
        let sql = format!(
            "SELECT {RECERT_COLUMNS} FROM recertification_records \
             WHERE status = 'active' AND cycle_end = $1 AND accumulated_hours < required_hours"
        );
        Ok(sqlx::query_as::<_, RecertificationRecord>(&sql)
            .bind(end)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn records_to_lapse(&self, today: NaiveDate) -> PortalResult<Vec<RecertificationRecord>> {
        let sql = format!(
            "SELECT {RECERT_COLUMNS} FROM recertification_records \
             WHERE status = 'active' AND cycle_end < $1 AND accumulated_hours < required_hours"
        );
        Ok(sqlx::query_as::<_, RecertificationRecord>(&sql)
            .bind(today)
            .fetch_all(&self.pool)
            .await?)
    }

    // ── Reminder ledger ──

    async fn claim_reminder(
        &self,
        key: &ReminderKey,
        due_date: NaiveDate,
        at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> PortalResult<bool> {
        // Insert-if-absent or take over an unsent row whose lease is free or
        // stale; the unique key serializes concurrent claimers.
        let claimed: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO scheduled_reminders
                (reminder_id, reminder_type, target_type, target_id, due_date, days_before,
                 sent, sent_at, claimed_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, NULL, $7)
            ON CONFLICT (reminder_type, target_type, target_id, days_before)
            DO UPDATE SET claimed_at = EXCLUDED.claimed_at, due_date = EXCLUDED.due_date
                WHERE scheduled_reminders.sent = FALSE
                  AND (scheduled_reminders.claimed_at IS NULL
                       OR scheduled_reminders.claimed_at < $8)
            RETURNING reminder_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key.reminder_type)
        .bind(key.target_type)
        .bind(key.target_id)
        .bind(due_date)
        .bind(key.days_before)
        .bind(at)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed.is_some())
    }

    async fn mark_reminder_sent(&self, key: &ReminderKey, at: DateTime<Utc>) -> PortalResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_reminders
            SET sent = TRUE, sent_at = $5, claimed_at = NULL
            WHERE reminder_type = $1 AND target_type = $2 AND target_id = $3 AND days_before = $4
            "#,
        )
        .bind(key.reminder_type)
        .bind(key.target_type)
        .bind(key.target_id)
        .bind(key.days_before)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(PortalError::not_found("scheduled_reminder", key));
        }
        Ok(())
    }

    async fn release_reminder(&self, key: &ReminderKey) -> PortalResult<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_reminders
            SET claimed_at = NULL
            WHERE reminder_type = $1 AND target_type = $2 AND target_id = $3 AND days_before = $4
              AND sent = FALSE
            "#,
        )
        .bind(key.reminder_type)
        .bind(key.target_type)
        .bind(key.target_id)
        .bind(key.days_before)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_reminder(&self, key: &ReminderKey) -> PortalResult<Option<ScheduledReminder>> {
        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM scheduled_reminders \
             WHERE reminder_type = $1 AND target_type = $2 AND target_id = $3 AND days_before = $4"
        );
        Ok(sqlx::query_as::<_, ScheduledReminder>(&sql)
            .bind(key.reminder_type)
            .bind(key.target_type)
            .bind(key.target_id)
            .bind(key.days_before)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_reminders(&self) -> PortalResult<Vec<ScheduledReminder>> {
        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM scheduled_reminders ORDER BY due_date, days_before"
        );
        Ok(sqlx::query_as::<_, ScheduledReminder>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }
}

async fn insert_phase_log(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    log: &PhaseLog,
) -> PortalResult<()> {
    let sql = format!(
        "INSERT INTO phase_logs ({PHASE_LOG_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    );
    sqlx::query(&sql)
        .bind(log.log_id)
        .bind(log.project_id)
        .bind(log.from_phase)
        .bind(log.to_phase)
        .bind(log.action)
        .bind(log.performed_by)
        .bind(log.performed_at)
        .bind(&log.notes)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
