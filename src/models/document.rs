//! Versioned project documents and review outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Review state of a document or of a project's current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "snake_case")
)]
pub enum ReviewStatus {
    Pending,
    Approved,
    ChangesRequested,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reviewer's decision. `Pending` is not a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "snake_case")
)]
pub enum ReviewOutcome {
    Approved,
    ChangesRequested,
    Rejected,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }

    /// Status a reviewed subject takes on
    pub fn status(&self) -> ReviewStatus {
        match self {
            Self::Approved => ReviewStatus::Approved,
            Self::ChangesRequested => ReviewStatus::ChangesRequested,
            Self::Rejected => ReviewStatus::Rejected,
        }
    }
}

impl FromStr for ReviewOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "changes_requested" => Ok(Self::ChangesRequested),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("Unknown review outcome: {}", other)),
        }
    }
}

/// One version of an uploaded document.
///
/// Versions chain through `parent_id`. A row is never rewritten once a newer
/// version exists; only the latest pending version accepts a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Document {
    pub document_id: Uuid,
    pub project_id: Uuid,
    pub phase_number: i32,
    /// Slot within the phase, e.g. `audit_report`
    pub document_key: String,
    pub document_name: String,
    pub version: i32,
    pub parent_id: Option<Uuid>,

    pub original_filename: String,
    /// Identifier returned by the document storage collaborator
    pub stored_id: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,

    pub status: ReviewStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
}

impl Document {
    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::Pending
    }
}

/// A blank form GEA publishes for one phase document slot.
///
/// Uploading a template for a slot retires the slot's previous template; the
/// old row stays downloadable but is no longer listed as active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct PhaseTemplate {
    pub template_id: Uuid,
    pub phase_number: i32,
    pub document_key: String,
    pub template_name: String,
    pub original_filename: String,
    pub stored_id: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_maps_onto_status() {
        assert_eq!(ReviewOutcome::Approved.status(), ReviewStatus::Approved);
        assert_eq!(ReviewOutcome::ChangesRequested.as_str(), "changes_requested");
        assert_eq!(
            "rejected".parse::<ReviewOutcome>(),
            Ok(ReviewOutcome::Rejected)
        );
        assert!("pending".parse::<ReviewOutcome>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ReviewStatus::ChangesRequested).unwrap();
        assert_eq!(json, "\"changes_requested\"");
    }
}
