//! In-app notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trigger event behind a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "snake_case")
)]
pub enum NotificationType {
    ChatMessage,
    Announcement,
    DocumentUploaded,
    DocumentReviewed,
    PhaseApproved,
    ChangesRequested,
    AssessorAssigned,
    LicenseReminder,
    CpdReminder,
    RecertificationReminder,
    ExpertAssigned,
    CommitteeAssigned,
    CpdReviewed,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMessage => "chat_message",
            Self::Announcement => "announcement",
            Self::DocumentUploaded => "document_uploaded",
            Self::DocumentReviewed => "document_reviewed",
            Self::PhaseApproved => "phase_approved",
            Self::ChangesRequested => "changes_requested",
            Self::AssessorAssigned => "assessor_assigned",
            Self::LicenseReminder => "license_reminder",
            Self::CpdReminder => "cpd_reminder",
            Self::RecertificationReminder => "recertification_reminder",
            Self::ExpertAssigned => "expert_assigned",
            Self::CommitteeAssigned => "committee_assigned",
            Self::CpdReviewed => "cpd_reviewed",
        }
    }
}

/// Subject entity a notification points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "snake_case")
)]
pub enum LinkType {
    Project,
    Document,
    Glab,
    Announcement,
    Cpd,
    RecertificationRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Notification {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub link_type: Option<LinkType>,
    pub link_id: Option<Uuid>,

    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,

    /// Independent of read state
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        link: Option<(LinkType, Uuid)>,
    ) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            user_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            link_type: link.map(|(t, _)| t),
            link_id: link.map(|(_, id)| id),
            is_read: false,
            read_at: None,
            email_sent: false,
            email_sent_at: None,
            created_at: Utc::now(),
        }
    }
}
