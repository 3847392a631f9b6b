//! Operational and quality checklists
//!
//! Two independently owned lists per (project, phase). The operating GLAB
//! completes `ChecklistItem`s; GEA completes `QualityChecklistItem`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operational checklist item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct ChecklistItem {
    pub item_id: Uuid,
    pub project_id: Uuid,
    pub phase_number: i32,
    pub item_text: String,
    /// Required items gate phase advancement
    pub is_required: bool,
    /// Added by an administrator rather than seeded
    pub is_custom: bool,
    pub is_completed: bool,
    pub completed_by: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sort_order: i32,
}

impl ChecklistItem {
    pub fn new(
        project_id: Uuid,
        phase_number: i32,
        item_text: impl Into<String>,
        is_required: bool,
        sort_order: i32,
    ) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            project_id,
            phase_number,
            item_text: item_text.into(),
            is_required,
            is_custom: false,
            is_completed: false,
            completed_by: None,
            completed_at: None,
            sort_order,
        }
    }

    /// Flip completion, stamping or clearing the completion facts
    pub fn toggle(&mut self, by: Uuid, at: DateTime<Utc>) {
        self.is_completed = !self.is_completed;
        if self.is_completed {
            self.completed_by = Some(by);
            self.completed_at = Some(at);
        } else {
            self.completed_by = None;
            self.completed_at = None;
        }
    }

    /// Required and still open
    pub fn blocks_advance(&self) -> bool {
        self.is_required && !self.is_completed
    }
}

/// Kind of oversight check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum CheckType {
    Received,
    Verified,
    Approved,
}

/// Quality (oversight) checklist item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct QualityChecklistItem {
    pub item_id: Uuid,
    pub project_id: Uuid,
    pub phase_number: i32,
    pub item_text: String,
    pub check_type: CheckType,
    pub is_checked: bool,
    pub checked_by: Option<Uuid>,
    pub checked_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Document the check refers to, if any
    pub document_id: Option<Uuid>,
    pub sort_order: i32,
}

impl QualityChecklistItem {
    pub fn new(
        project_id: Uuid,
        phase_number: i32,
        item_text: impl Into<String>,
        check_type: CheckType,
        sort_order: i32,
    ) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            project_id,
            phase_number,
            item_text: item_text.into(),
            check_type,
            is_checked: false,
            checked_by: None,
            checked_at: None,
            notes: None,
            document_id: None,
            sort_order,
        }
    }

    pub fn toggle(&mut self, by: Uuid, at: DateTime<Utc>, notes: Option<String>) {
        self.is_checked = !self.is_checked;
        if self.is_checked {
            self.checked_by = Some(by);
            self.checked_at = Some(at);
            if notes.is_some() {
                self.notes = notes;
            }
        } else {
            self.checked_by = None;
            self.checked_at = None;
        }
    }
}
