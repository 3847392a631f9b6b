//! Project status snapshot

use serde::Serialize;

use crate::error::Blocker;
use crate::models::{ChecklistItem, Document, PhaseReview, Project, ProjectMember, QualityChecklistItem};

/// Completion counts for one phase's operational checklist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChecklistProgress {
    pub completed: usize,
    pub total: usize,
    /// Required items still open
    pub required_open: usize,
}

impl ChecklistProgress {
    pub fn of(items: &[ChecklistItem]) -> Self {
        Self {
            completed: items.iter().filter(|i| i.is_completed).count(),
            total: items.len(),
            required_open: items.iter().filter(|i| i.blocks_advance()).count(),
        }
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total) as u8
    }
}

/// Checked counts for one phase's quality checklist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityProgress {
    pub checked: usize,
    pub total: usize,
}

impl QualityProgress {
    pub fn of(items: &[QualityChecklistItem]) -> Self {
        Self {
            checked: items.iter().filter(|i| i.is_checked).count(),
            total: items.len(),
        }
    }
}

/// Everything a project page needs about the current phase
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub project: Project,
    pub phase_key: &'static str,
    pub phase_name: &'static str,
    pub is_final_phase: bool,
    /// Empty when the project may advance
    pub blockers: Vec<Blocker>,
    pub can_advance: bool,
    pub checklist: ChecklistProgress,
    pub quality: QualityProgress,
    pub latest_review: Option<PhaseReview>,
    /// Every version uploaded in the current phase
    pub documents: Vec<Document>,
    /// Required slots of the current phase with no upload yet
    pub missing_documents: Vec<&'static str>,
    pub members: Vec<ProjectMember>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_progress_counts() {
        let project = Uuid::new_v4();
        let mut items = vec![
            ChecklistItem::new(project, 1, "a", true, 1),
            ChecklistItem::new(project, 1, "b", true, 2),
            ChecklistItem::new(project, 1, "c", false, 3),
            ChecklistItem::new(project, 1, "d", false, 4),
        ];
        items[0].toggle(Uuid::new_v4(), Utc::now());

        let progress = ChecklistProgress::of(&items);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.required_open, 1);
        assert_eq!(progress.percent(), 25);
        assert_eq!(ChecklistProgress::of(&[]).percent(), 100);
    }
}
