//! Continuing professional development
//!
//! Assessors log CPD activities, GEA reviews them, and approved hours are
//! credited to the assessor's active recertification cycle. Renewal closes a
//! cycle that has enough hours, re-certifies the assessor and opens the next
//! three-year cycle.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blob_store::{allowed_extension, DocumentStorage, ALLOWED_EXTENSIONS};
use crate::error::{Blocker, BlockerType, PortalError, PortalResult};
use crate::models::*;
use crate::notify::{NotificationDispatcher, NotificationDraft};
use crate::permissions::{Capability, Role};
use crate::store::{approved_hours, CertificationRenewal, CpdReviewUpdate, PortalStore};
use crate::workflow::access::require;
use crate::workflow::DEFAULT_MAX_UPLOAD_BYTES;

/// Hours required per cycle when none is configured
pub const DEFAULT_REQUIRED_HOURS: i64 = 60;

/// An activity as submitted by an assessor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCpdActivity {
    pub activity_type: String,
    pub activity_title: String,
    pub activity_date: NaiveDate,
    pub hours: Decimal,
    pub description: Option<String>,
}

/// Uploaded evidence for a CPD activity
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    pub filename: &'a str,
    pub content: &'a [u8],
}

/// Where an assessor stands in the current cycle
#[derive(Debug, Clone, Serialize)]
pub struct CpdSummary {
    pub assessor_id: Uuid,
    pub active_cycle: Option<RecertificationRecord>,
    /// Approved hours across every log the assessor has filed
    pub approved_hours_total: Decimal,
    pub pending_logs: usize,
    pub recertification_due: Option<NaiveDate>,
}

pub struct CpdService {
    store: Arc<dyn PortalStore>,
    documents: Arc<dyn DocumentStorage>,
    notifier: Arc<NotificationDispatcher>,
    required_hours: Decimal,
    max_upload_bytes: usize,
}

impl CpdService {
    pub fn new(
        store: Arc<dyn PortalStore>,
        documents: Arc<dyn DocumentStorage>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            documents,
            notifier,
            required_hours: Decimal::from(DEFAULT_REQUIRED_HOURS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_required_hours(mut self, required_hours: Decimal) -> Self {
        self.required_hours = required_hours;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    async fn load_assessor(&self, assessor_id: Uuid) -> PortalResult<User> {
        let user = self
            .store
            .get_user(assessor_id)
            .await?
            .ok_or_else(|| PortalError::not_found("user", assessor_id))?;
        if user.role != Role::GlabAssessor {
            return Err(PortalError::validation(format!(
                "{} is not an assessor",
                user.username
            )));
        }
        Ok(user)
    }

    /// Log an activity for the acting assessor
    pub async fn submit_cpd(
        &self,
        actor: &User,
        activity: NewCpdActivity,
        evidence: Option<Evidence<'_>>,
    ) -> PortalResult<CpdLog> {
        require(actor, Capability::SubmitCpd)?;

        if activity.hours <= Decimal::ZERO {
            return Err(PortalError::validation("CPD hours must be greater than zero"));
        }
        if activity.activity_title.trim().is_empty() {
            return Err(PortalError::validation("Activity title is required"));
        }
        if activity.activity_type.trim().is_empty() {
            return Err(PortalError::validation("Activity type is required"));
        }

        let (evidence_filename, evidence_stored_id) = match evidence {
            Some(e) => {
                if allowed_extension(e.filename).is_none() {
                    return Err(PortalError::validation(format!(
                        "File type not allowed; expected one of {}",
                        ALLOWED_EXTENSIONS.join(", ")
                    )));
                }
                if e.content.is_empty() {
                    return Err(PortalError::validation("Evidence file is empty"));
                }
                if e.content.len() > self.max_upload_bytes {
                    return Err(PortalError::validation(format!(
                        "File exceeds the {} byte upload limit",
                        self.max_upload_bytes
                    )));
                }
                let stored = self.documents.store(e.filename, e.content).await?;
                (Some(e.filename.to_string()), Some(stored))
            }
            None => (None, None),
        };

        let log = CpdLog {
            cpd_log_id: Uuid::new_v4(),
            assessor_id: actor.user_id,
            activity_type: activity.activity_type.trim().to_string(),
            activity_title: activity.activity_title.trim().to_string(),
            activity_date: activity.activity_date,
            hours: activity.hours,
            description: activity.description,
            evidence_filename,
            evidence_stored_id,
            status: CpdStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            submitted_at: Utc::now(),
        };
        if let Err(e) = self.store.insert_cpd_log(&log).await {
            if let Some(stored_id) = &log.evidence_stored_id {
                if let Err(cleanup) = self.documents.delete(stored_id).await {
                    warn!(stored_id = %stored_id, "Orphaned CPD evidence: {}", cleanup);
                }
            }
            return Err(e);
        }

        info!(assessor = %actor.username, hours = %log.hours, "CPD activity logged");
        Ok(log)
    }

    /// Assessors see their own logs; GEA sees everyone's, optionally filtered
    pub async fn list_cpd(
        &self,
        actor: &User,
        assessor_id: Option<Uuid>,
        status: Option<CpdStatus>,
    ) -> PortalResult<Vec<CpdLog>> {
        let assessor_id = match actor.role {
            Role::GlabAssessor => Some(actor.user_id),
            role if role.is_gea() => assessor_id,
            _ => return Err(PortalError::denied("No access to CPD logs")),
        };
        self.store.list_cpd_logs(assessor_id, status).await
    }

    /// Approve or reject a pending log; approval credits the active cycle
    pub async fn review_cpd(
        &self,
        actor: &User,
        cpd_log_id: Uuid,
        approve: bool,
        notes: Option<String>,
    ) -> PortalResult<CpdLog> {
        require(actor, Capability::ReviewCpd)?;
        let log = self
            .store
            .get_cpd_log(cpd_log_id)
            .await?
            .ok_or_else(|| PortalError::not_found("cpd_log", cpd_log_id))?;
        if log.status != CpdStatus::Pending {
            return Err(already_reviewed(&log));
        }

        let active = self.store.active_recertification(log.assessor_id).await?;
        let update = CpdReviewUpdate {
            cpd_log_id,
            approve,
            reviewed_by: actor.user_id,
            reviewed_at: Utc::now(),
            notes,
            credit_record_id: active.map(|r| r.record_id),
        };
        let reviewed = self
            .store
            .review_cpd_log(&update)
            .await?
            .ok_or_else(|| already_reviewed(&log))?;

        info!(
            cpd_log = %cpd_log_id,
            status = reviewed.status.as_str(),
            hours = %reviewed.hours,
            "CPD log reviewed"
        );

        let verb = reviewed.status.as_str();
        let draft = NotificationDraft::new(
            NotificationType::CpdReviewed,
            format!("CPD Log {}", title_case(verb)),
            format!(
                "Your CPD activity \"{}\" has been {}.",
                reviewed.activity_title, verb
            ),
        )
        .link(LinkType::Cpd, reviewed.cpd_log_id);
        if let Err(e) = self.notifier.notify_user(reviewed.assessor_id, &draft).await {
            tracing::warn!(cpd_log = %cpd_log_id, "CPD review notification failed: {}", e);
        }

        Ok(reviewed)
    }

    /// Open a recertification cycle for an assessor
    pub async fn open_cycle(
        &self,
        actor: &User,
        assessor_id: Uuid,
        cycle_start: NaiveDate,
    ) -> PortalResult<RecertificationRecord> {
        require(actor, Capability::RenewCertification)?;
        let assessor = self.load_assessor(assessor_id).await?;

        let record = RecertificationRecord::open(assessor_id, cycle_start, self.required_hours);
        self.store.insert_recertification(&record).await?;

        info!(
            assessor = %assessor.username,
            cycle_end = %record.cycle_end,
            "Recertification cycle opened"
        );
        Ok(record)
    }

    /// Complete the active cycle, re-certify and open the next cycle
    pub async fn renew_certification(
        &self,
        actor: &User,
        assessor_id: Uuid,
        renewed_on: NaiveDate,
    ) -> PortalResult<RecertificationRecord> {
        require(actor, Capability::RenewCertification)?;
        let assessor = self.load_assessor(assessor_id).await?;

        let no_cycle = || {
            PortalError::blocked(Blocker::new(
                BlockerType::NoActiveCycle { assessor_id },
                format!("{} has no active recertification cycle", assessor_id),
            ))
        };
        let active = self
            .store
            .active_recertification(assessor_id)
            .await?
            .ok_or_else(no_cycle)?;
        if !active.has_sufficient_hours() {
            return Err(PortalError::blocked(
                Blocker::new(
                    BlockerType::InsufficientCpdHours {
                        record_id: active.record_id,
                    },
                    format!(
                        "{} more approved CPD hours required",
                        active.remaining_hours()
                    ),
                )
                .with_detail("required", serde_json::json!(active.required_hours))
                .with_detail("accumulated", serde_json::json!(active.accumulated_hours)),
            ));
        }

        let recertification_due = add_years(renewed_on, CERTIFICATION_CYCLE_YEARS);
        let next = RecertificationRecord::open(assessor_id, renewed_on, self.required_hours);
        self.store
            .renew_certification(&CertificationRenewal {
                closing_record_id: active.record_id,
                closed_at: Utc::now(),
                assessor_id,
                certification_date: renewed_on,
                recertification_due,
                next: next.clone(),
            })
            .await?
            .ok_or_else(no_cycle)?;

        info!(
            assessor = %assessor.username,
            recertification_due = %recertification_due,
            "Assessor recertified"
        );
        Ok(next)
    }

    pub async fn summary(&self, actor: &User, assessor_id: Uuid) -> PortalResult<CpdSummary> {
        if !(actor.role.is_gea() || actor.user_id == assessor_id) {
            return Err(PortalError::denied("No access to this assessor's CPD"));
        }
        let assessor = self.load_assessor(assessor_id).await?;
        let logs = self.store.list_cpd_logs(Some(assessor_id), None).await?;

        Ok(CpdSummary {
            assessor_id,
            active_cycle: self.store.active_recertification(assessor_id).await?,
            approved_hours_total: approved_hours(&logs),
            pending_logs: logs
                .iter()
                .filter(|l| l.status == CpdStatus::Pending)
                .count(),
            recertification_due: assessor.recertification_due,
        })
    }
}

fn already_reviewed(log: &CpdLog) -> PortalError {
    PortalError::blocked(Blocker::new(
        BlockerType::CpdAlreadyReviewed {
            cpd_log_id: log.cpd_log_id,
        },
        format!("CPD log \"{}\" was already reviewed", log.activity_title),
    ))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
