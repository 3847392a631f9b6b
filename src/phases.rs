//! Phase Catalogue
//!
//! The six fixed lifecycle stages, the document slots each one accepts, and the
//! operational and quality checklists seeded for every new project.

use serde::Serialize;

use crate::models::CheckType;

pub const FIRST_PHASE: i32 = 1;
pub const FINAL_PHASE: i32 = 6;

/// An upload slot within a phase
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DocumentSlot {
    pub key: &'static str,
    pub name: &'static str,
    pub required: bool,
}

/// Static definition of one phase
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PhaseDefinition {
    pub number: i32,
    pub key: &'static str,
    pub name: &'static str,
    pub documents: &'static [DocumentSlot],
    /// Operational items, all seeded as required
    pub checklist: &'static [&'static str],
    pub quality_checklist: &'static [(&'static str, CheckType)],
}

impl PhaseDefinition {
    pub fn document_slot(&self, key: &str) -> Option<&'static DocumentSlot> {
        self.documents.iter().find(|d| d.key == key)
    }
}

const fn slot(key: &'static str, name: &'static str, required: bool) -> DocumentSlot {
    DocumentSlot {
        key,
        name,
        required,
    }
}

use CheckType::{Approved, Received, Verified};

pub static PHASES: [PhaseDefinition; 6] = [
    PhaseDefinition {
        number: 1,
        key: "proposal",
        name: "Proposal",
        documents: &[
            slot("enrollment_form", "GEA Certification Enrollment Form", true),
            slot("readiness_checklist", "Enrollment Readiness Criteria/Checklist", true),
            slot("coi_declaration", "Conflict of Interest Declaration", true),
            slot("preliminary_report", "Preliminary Assessment Report", false),
        ],
        checklist: &[
            "Enrollment form received and complete",
            "Eligibility criteria verified",
            "Organizational scope defined",
            "Multi-site requirements clarified (if applicable)",
            "Conflict of interest declarations obtained",
            "Assessor competencies matched to scope",
            "Proposal and fee agreed with client",
        ],
        quality_checklist: &[
            ("Enrollment form received", Received),
            ("Organization meets eligibility criteria", Verified),
            ("No unresolved conflicts of interest", Verified),
            ("Proposal approved", Approved),
        ],
    },
    PhaseDefinition {
        number: 2,
        key: "engagement",
        name: "Engagement",
        documents: &[
            slot("letter_of_engagement", "Letter of Engagement", true),
            slot("planning_form", "Assessment Planning & Logistics Form", true),
            slot("timeline_map", "Assessment Timeline & Workflow Map", true),
        ],
        checklist: &[
            "Letter of Engagement signed",
            "Scope and boundaries confirmed",
            "Assessment timeline developed",
            "Site visit schedule finalized",
            "Logistics arrangements completed",
            "Initial payment (50%) collected",
            "GEA fee remitted for initial payment",
        ],
        quality_checklist: &[
            ("Letter of Engagement received", Received),
            ("Timeline is realistic", Verified),
            ("Initial payment received", Verified),
            ("GEA fee remitted", Approved),
        ],
    },
    PhaseDefinition {
        number: 3,
        key: "assessment",
        name: "Assessment",
        documents: &[
            slot("triangulation_checklist", "Triangulation Checklist Sheet", true),
            slot("rca_worksheet", "Root Cause Analysis (RCA) Worksheet", true),
            slot("ncr_form", "Non-Conformance Tracker (NCR / CAR Form)", true),
        ],
        checklist: &[
            "Opening meeting conducted",
            "All 8 dimensions assessed",
            "Triangulation methodology applied",
            "Evidence collection documented",
            "Root cause analysis performed",
            "Non-conformances identified and CARs issued",
            "Closing meeting held",
        ],
        quality_checklist: &[
            ("Assessment evidence received", Received),
            ("Triangulation properly applied", Verified),
            ("Non-conformances appropriately identified", Verified),
            ("Assessment approved", Approved),
        ],
    },
    PhaseDefinition {
        number: 4,
        key: "reporting",
        name: "Reporting",
        documents: &[
            slot("assessment_report", "Formal Assessment Report", true),
            slot("peer_review_checklist", "Peer Review Guide / Checklist", true),
        ],
        checklist: &[
            "Draft report prepared",
            "Evidence references verified",
            "Peer review conducted",
            "Review feedback addressed",
            "Report delivered to GLAB",
        ],
        quality_checklist: &[
            ("Assessment report received", Received),
            ("All findings are evidence-based", Verified),
            ("Peer review properly conducted", Verified),
            ("Report approved", Approved),
        ],
    },
    PhaseDefinition {
        number: 5,
        key: "certification",
        name: "Certification",
        documents: &[
            slot("decision_record", "Certification Decision Record", true),
            slot("feedback_report", "Feedback Report to Organization", true),
        ],
        checklist: &[
            "Certification criteria evaluated",
            "Decision record prepared",
            "Decision communicated to organization",
            "Certificate issued (if applicable)",
            "Final payment (50%) collected",
            "GEA fee remitted for final payment",
        ],
        quality_checklist: &[
            ("Decision record received", Received),
            ("Decision is supported by evidence", Verified),
            ("Final payment received", Verified),
            ("Certificate ready for issuance", Approved),
        ],
    },
    PhaseDefinition {
        number: 6,
        key: "post_certification",
        name: "Post-Certification",
        documents: &[
            slot("change_notification", "Change Notification Form", false),
            slot("feedback_form", "Feedback Form on GLAB Services", false),
        ],
        checklist: &[
            "Surveillance schedule established",
            "Feedback on GLAB services requested",
            "Assessment documents archived",
            "Final billing processed",
        ],
        quality_checklist: &[
            ("Feedback collected", Received),
            ("All documentation properly archived", Verified),
            ("Surveillance schedule approved", Approved),
        ],
    },
];

/// Definition of phase `number`, if it is in range
pub fn phase(number: i32) -> Option<&'static PhaseDefinition> {
    if (FIRST_PHASE..=FINAL_PHASE).contains(&number) {
        PHASES.get((number - 1) as usize)
    } else {
        None
    }
}

pub fn phase_name(number: i32) -> &'static str {
    phase(number).map(|p| p.name).unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_are_numbered_in_order() {
        for (i, p) in PHASES.iter().enumerate() {
            assert_eq!(p.number, i as i32 + 1);
            assert!(!p.checklist.is_empty(), "{} has no checklist", p.name);
            assert!(!p.quality_checklist.is_empty());
        }
        assert_eq!(phase(FINAL_PHASE).map(|p| p.key), Some("post_certification"));
        assert!(phase(0).is_none());
        assert!(phase(7).is_none());
    }

    #[test]
    fn test_document_keys_are_unique_across_phases() {
        let mut keys: Vec<_> = PHASES
            .iter()
            .flat_map(|p| p.documents.iter().map(|d| d.key))
            .collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_document_slot_lookup() {
        let reporting = phase(4).unwrap();
        assert!(reporting.document_slot("assessment_report").is_some());
        assert!(reporting.document_slot("enrollment_form").is_none());
        assert_eq!(phase_name(2), "Engagement");
        assert_eq!(phase_name(9), "Unknown");
    }
}
