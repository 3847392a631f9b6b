//! Error handling for the portal core
//!
//! One taxonomy is shared by every workflow operation so callers can map
//! outcomes to user-visible responses without inspecting message text.
//! `PreconditionNotMet` always carries the blockers that caused it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::blob_store::BlobStoreError;

/// Result alias used across the crate
pub type PortalResult<T> = Result<T, PortalError>;

/// Main error type for the portal core
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Precondition not met: {}", summarize(.blockers))]
    PreconditionNotMet { blockers: Vec<Blocker> },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Document storage error: {0}")]
    DocumentStorage(#[from] BlobStoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PortalError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Single-blocker precondition failure
    pub fn blocked(blocker: Blocker) -> Self {
        Self::PreconditionNotMet {
            blockers: vec![blocker],
        }
    }

    /// Blockers attached to a `PreconditionNotMet`, empty for other variants
    pub fn blockers(&self) -> &[Blocker] {
        match self {
            Self::PreconditionNotMet { blockers } => blockers,
            _ => &[],
        }
    }
}

fn summarize(blockers: &[Blocker]) -> String {
    blockers
        .iter()
        .map(|b| b.description.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for PortalError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortalError::Conflict(db.message().to_string())
            }
            _ => PortalError::Storage(err.to_string()),
        }
    }
}

/// Something that prevents a workflow operation from proceeding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Blocker {
    /// Type of blocker with details
    pub blocker_type: BlockerType,
    /// Human-readable description
    pub description: String,
    /// Additional context for resolution
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
}

impl Blocker {
    pub fn new(blocker_type: BlockerType, description: impl Into<String>) -> Self {
        Self {
            blocker_type,
            description: description.into(),
            details: HashMap::new(),
        }
    }

    /// Add a detail
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Types of blockers with their specific data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BlockerType {
    // ─────────────────────────────────────────────────────────────────────────
    // Phase advancement
    // ─────────────────────────────────────────────────────────────────────────
    /// Required operational checklist item not completed
    ChecklistItemIncomplete { item_id: Uuid, phase: i32 },

    /// No phase review recorded for the phase
    PhaseReviewMissing { phase: i32 },

    /// Latest phase review is not an approval
    PhaseReviewNotApproved { phase: i32, outcome: String },

    /// Project already sits in the last phase
    FinalPhaseReached,

    /// Phase changed underneath the caller
    PhaseChanged { expected: i32, actual: i32 },

    // ─────────────────────────────────────────────────────────────────────────
    // Documents
    // ─────────────────────────────────────────────────────────────────────────
    /// Document already carries a review outcome
    DocumentAlreadyReviewed { document_id: Uuid, status: String },

    /// Document has a newer version
    DocumentSuperseded {
        document_id: Uuid,
        latest_id: Uuid,
    },

    /// Latest version is approved, nothing to resubmit
    DocumentApproved { document_id: Uuid },

    // ─────────────────────────────────────────────────────────────────────────
    // Organizations and assessors
    // ─────────────────────────────────────────────────────────────────────────
    /// GLAB is not active
    GlabInactive { glab_id: Uuid, status: String },

    /// CPD log was already reviewed
    CpdAlreadyReviewed { cpd_log_id: Uuid },

    /// Recertification cycle lacks approved CPD hours
    InsufficientCpdHours { record_id: Uuid },

    /// No active recertification cycle for the assessor
    NoActiveCycle { assessor_id: Uuid },

    /// Actor tried to act on their own account
    SelfAction,
}
