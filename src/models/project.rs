//! Certification projects, their phase audit trail and phase reviews

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{ReviewOutcome, ReviewStatus};
use crate::permissions::Role;

/// GEA share of the client fee (15%)
pub const GEA_FEE_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);

/// Kind of certification engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum AssessmentType {
    Initial,
    Surveillance,
    Recertification,
}

/// The central workflow unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Project {
    pub project_id: Uuid,
    pub reference_number: String,
    pub glab_id: Uuid,
    pub client_id: Uuid,
    pub assessment_type: AssessmentType,
    /// 1..=6, only increases outside administrative override
    pub current_phase: i32,

    /// Central-authority review state of the current phase
    pub gea_status: ReviewStatus,
    pub gea_notes: Option<String>,
    pub gea_reviewed_by: Option<Uuid>,
    pub gea_reviewed_at: Option<DateTime<Utc>>,

    // Financial
    pub client_fee: Decimal,
    pub gea_fee: Decimal,
    pub glab_revenue: Decimal,
    pub initial_payment_received: bool,
    pub initial_payment_date: Option<NaiveDate>,
    pub final_payment_received: bool,
    pub final_payment_date: Option<NaiveDate>,
    pub gea_fee_remitted: bool,
    pub gea_fee_remitted_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

impl Project {
    /// New project in phase 1 with the fee split applied
    pub fn new(
        reference_number: String,
        glab_id: Uuid,
        client_id: Uuid,
        assessment_type: AssessmentType,
        client_fee: Decimal,
        created_by: Option<Uuid>,
    ) -> Self {
        let (gea_fee, glab_revenue) = Self::fee_split(client_fee);
        Self {
            project_id: Uuid::new_v4(),
            reference_number,
            glab_id,
            client_id,
            assessment_type,
            current_phase: 1,
            gea_status: ReviewStatus::Pending,
            gea_notes: None,
            gea_reviewed_by: None,
            gea_reviewed_at: None,
            client_fee,
            gea_fee,
            glab_revenue,
            initial_payment_received: false,
            initial_payment_date: None,
            final_payment_received: false,
            final_payment_date: None,
            gea_fee_remitted: false,
            gea_fee_remitted_date: None,
            created_at: Utc::now(),
            created_by,
        }
    }

    /// (GEA fee, GLAB revenue) for an agreed client fee
    pub fn fee_split(client_fee: Decimal) -> (Decimal, Decimal) {
        let gea_fee = client_fee * GEA_FEE_RATE;
        (gea_fee, client_fee - gea_fee)
    }

    /// Is the milestone already recorded?
    pub fn milestone_recorded(&self, milestone: PaymentMilestone) -> bool {
        match milestone {
            PaymentMilestone::Initial => self.initial_payment_received,
            PaymentMilestone::Final => self.final_payment_received,
            PaymentMilestone::GeaFeeRemitted => self.gea_fee_remitted,
        }
    }

    /// Record the milestone; returns false if it was already set
    pub fn record_milestone(&mut self, milestone: PaymentMilestone, on: NaiveDate) -> bool {
        if self.milestone_recorded(milestone) {
            return false;
        }
        match milestone {
            PaymentMilestone::Initial => {
                self.initial_payment_received = true;
                self.initial_payment_date = Some(on);
            }
            PaymentMilestone::Final => {
                self.final_payment_received = true;
                self.final_payment_date = Some(on);
            }
            PaymentMilestone::GeaFeeRemitted => {
                self.gea_fee_remitted = true;
                self.gea_fee_remitted_date = Some(on);
            }
        }
        true
    }
}

/// Independent payment facts tracked per project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMilestone {
    /// 50% on engagement
    Initial,
    /// 50% on certification
    Final,
    GeaFeeRemitted,
}

impl PaymentMilestone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Final => "final",
            Self::GeaFeeRemitted => "gea_fee_remitted",
        }
    }
}

/// Role-constrained project membership sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "snake_case")
)]
pub enum MemberKind {
    Assessor,
    TechnicalExpert,
    CommitteeMember,
}

impl MemberKind {
    /// The role a user must hold to join this set
    pub fn required_role(&self) -> Role {
        match self {
            Self::Assessor => Role::GlabAssessor,
            Self::TechnicalExpert => Role::TechnicalExpert,
            Self::CommitteeMember => Role::CertCommittee,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assessor => "assessor",
            Self::TechnicalExpert => "technical_expert",
            Self::CommitteeMember => "committee_member",
        }
    }

    /// Membership kind a role would be assigned through, if any
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::GlabAssessor => Some(Self::Assessor),
            Role::TechnicalExpert => Some(Self::TechnicalExpert),
            Role::CertCommittee => Some(Self::CommitteeMember),
            _ => None,
        }
    }
}

/// One membership row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub kind: MemberKind,
    pub assigned_by: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
}

/// Kind of phase log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum PhaseAction {
    Created,
    Advanced,
    Override,
}

/// Record of a phase transition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct PhaseLog {
    pub log_id: Uuid,
    pub project_id: Uuid,
    pub from_phase: Option<i32>,
    pub to_phase: i32,
    pub action: PhaseAction,
    pub performed_by: Option<Uuid>,
    pub performed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl PhaseLog {
    pub fn new(
        project_id: Uuid,
        from_phase: Option<i32>,
        to_phase: i32,
        action: PhaseAction,
        performed_by: Option<Uuid>,
        notes: Option<String>,
    ) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            project_id,
            from_phase,
            to_phase,
            action,
            performed_by,
            performed_at: Utc::now(),
            notes,
        }
    }
}

/// Authoritative GEA decision on a (project, phase)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct PhaseReview {
    pub review_id: Uuid,
    pub project_id: Uuid,
    pub phase_number: i32,
    pub outcome: ReviewOutcome,
    pub reviewer_id: Uuid,
    pub notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn project(fee: &str) -> Project {
        Project::new(
            "GL-001-2025-0001".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            AssessmentType::Initial,
            Decimal::from_str(fee).unwrap(),
            None,
        )
    }

    #[test]
    fn test_gea_fee_is_exactly_fifteen_percent() {
        let p = project("10000");
        assert_eq!(p.gea_fee, Decimal::from(1500));
        assert_eq!(p.glab_revenue, Decimal::from(8500));
        assert_eq!(p.current_phase, 1);
        assert_eq!(p.gea_status, ReviewStatus::Pending);
    }

    #[test]
    fn test_fee_split_keeps_cents() {
        let (gea, glab) = Project::fee_split(Decimal::from_str("1234.56").unwrap());
        assert_eq!(gea, Decimal::from_str("185.184").unwrap());
        assert_eq!(gea + glab, Decimal::from_str("1234.56").unwrap());
    }

    #[test]
    fn test_milestones_are_independent_and_set_once() {
        let mut p = project("5000");
        let day = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();

        assert!(p.record_milestone(PaymentMilestone::Final, day));
        assert!(!p.initial_payment_received);
        assert!(!p.record_milestone(PaymentMilestone::Final, day));
        assert!(p.record_milestone(PaymentMilestone::Initial, day));
        assert_eq!(p.initial_payment_date, Some(day));
    }

    #[test]
    fn test_member_kind_roles() {
        assert_eq!(MemberKind::Assessor.required_role(), Role::GlabAssessor);
        assert_eq!(
            MemberKind::for_role(Role::CertCommittee),
            Some(MemberKind::CommitteeMember)
        );
        assert_eq!(MemberKind::for_role(Role::GeaAdmin), None);
    }
}
