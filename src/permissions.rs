//! Role Permission Matrix
//!
//! The closed set of portal roles and the single table that says which role
//! may exercise which capability. Organization scoping (same GLAB, assigned
//! to the project) is layered on top by the workflow engine; this module only
//! answers the role question so it can be audited and tested on its own.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Portal roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "text", rename_all = "snake_case")
)]
pub enum Role {
    GeaAdmin,
    GeaStaff,
    GlabAdmin,
    GlabAssessor,
    TechnicalExpert,
    CertCommittee,
    ClientUser,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::GeaAdmin,
        Role::GeaStaff,
        Role::GlabAdmin,
        Role::GlabAssessor,
        Role::TechnicalExpert,
        Role::CertCommittee,
        Role::ClientUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeaAdmin => "gea_admin",
            Self::GeaStaff => "gea_staff",
            Self::GlabAdmin => "glab_admin",
            Self::GlabAssessor => "glab_assessor",
            Self::TechnicalExpert => "technical_expert",
            Self::CertCommittee => "cert_committee",
            Self::ClientUser => "client_user",
        }
    }

    /// Central-authority roles
    pub fn is_gea(&self) -> bool {
        matches!(self, Self::GeaAdmin | Self::GeaStaff)
    }

    /// Operating-organization roles, always affiliated with a GLAB
    pub fn is_glab(&self) -> bool {
        matches!(self, Self::GlabAdmin | Self::GlabAssessor)
    }

    /// Roles that must carry a client affiliation
    pub fn requires_client(&self) -> bool {
        matches!(self, Self::ClientUser)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Actions gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    // ── Directory ──
    ManageUsers,
    ManageGlabs,
    CreateClient,

    // ── Projects ──
    CreateProject,
    ViewProject,
    ManageAssessors,
    AssignExpert,
    AssignCommittee,
    RecordPayment,
    OverridePhase,

    // ── Phase workflow ──
    ToggleOperationalItem,
    ToggleQualityItem,
    AddChecklistItem,
    SubmitDocument,
    ReviewDocument,
    ManageTemplates,
    SetPhaseReview,
    AdvancePhase,

    // ── Collaboration ──
    PostMessage,
    PublishAnnouncement,
    RetractAnnouncement,

    // ── Professional development ──
    SubmitCpd,
    ReviewCpd,
    RenewCertification,
}

use Role::*;

const GEA: &[Role] = &[GeaAdmin, GeaStaff];
const GEA_ADMIN: &[Role] = &[GeaAdmin];
const OPERATING: &[Role] = &[GlabAdmin, GlabAssessor];

/// The permission table. Read access is deliberately wider than write access.
const PERMISSIONS: &[(Capability, &[Role])] = &[
    (Capability::ManageUsers, GEA_ADMIN),
    (Capability::ManageGlabs, GEA_ADMIN),
    (Capability::CreateClient, &[GeaAdmin, GeaStaff, GlabAdmin]),
    (Capability::CreateProject, &[GeaAdmin, GeaStaff, GlabAdmin]),
    (
        Capability::ViewProject,
        &[
            GeaAdmin,
            GeaStaff,
            GlabAdmin,
            GlabAssessor,
            TechnicalExpert,
            CertCommittee,
            ClientUser,
        ],
    ),
    (Capability::ManageAssessors, &[GeaAdmin, GeaStaff, GlabAdmin]),
    (Capability::AssignExpert, GEA),
    (Capability::AssignCommittee, GEA_ADMIN),
    (Capability::RecordPayment, &[GeaAdmin, GeaStaff, GlabAdmin]),
    (Capability::OverridePhase, GEA_ADMIN),
    (Capability::ToggleOperationalItem, OPERATING),
    (Capability::ToggleQualityItem, GEA),
    (Capability::AddChecklistItem, GEA_ADMIN),
    (Capability::SubmitDocument, OPERATING),
    (Capability::ReviewDocument, GEA),
    (Capability::ManageTemplates, GEA_ADMIN),
    (Capability::SetPhaseReview, GEA),
    (Capability::AdvancePhase, OPERATING),
    (
        Capability::PostMessage,
        &[GeaAdmin, GeaStaff, GlabAdmin, GlabAssessor, TechnicalExpert],
    ),
    (Capability::PublishAnnouncement, GEA),
    (Capability::RetractAnnouncement, GEA_ADMIN),
    (Capability::SubmitCpd, &[GlabAssessor]),
    (Capability::ReviewCpd, GEA),
    (Capability::RenewCertification, GEA),
];

/// Roles allowed to exercise a capability
pub fn roles_for(capability: Capability) -> &'static [Role] {
    PERMISSIONS
        .iter()
        .find(|(c, _)| *c == capability)
        .map(|(_, roles)| *roles)
        .unwrap_or(&[])
}

/// Does the role grant the capability?
pub fn allows(role: Role, capability: Capability) -> bool {
    roles_for(capability).contains(&role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checklists_are_owned_by_disjoint_role_sets() {
        for role in Role::ALL {
            assert!(
                !(allows(role, Capability::ToggleOperationalItem)
                    && allows(role, Capability::ToggleQualityItem)),
                "{role} may toggle both checklists"
            );
        }
        assert!(allows(GlabAssessor, Capability::ToggleOperationalItem));
        assert!(!allows(GeaStaff, Capability::ToggleOperationalItem));
        assert!(allows(GeaStaff, Capability::ToggleQualityItem));
        assert!(!allows(GlabAdmin, Capability::ToggleQualityItem));
    }

    #[test]
    fn test_reviews_are_central_authority_only() {
        for role in Role::ALL {
            assert_eq!(allows(role, Capability::ReviewDocument), role.is_gea());
            assert_eq!(allows(role, Capability::SetPhaseReview), role.is_gea());
        }
    }

    #[test]
    fn test_every_capability_has_an_entry() {
        let all = [
            Capability::ManageUsers,
            Capability::ManageGlabs,
            Capability::CreateClient,
            Capability::CreateProject,
            Capability::ViewProject,
            Capability::ManageAssessors,
            Capability::AssignExpert,
            Capability::AssignCommittee,
            Capability::RecordPayment,
            Capability::OverridePhase,
            Capability::ToggleOperationalItem,
            Capability::ToggleQualityItem,
            Capability::AddChecklistItem,
            Capability::SubmitDocument,
            Capability::ReviewDocument,
            Capability::ManageTemplates,
            Capability::SetPhaseReview,
            Capability::AdvancePhase,
            Capability::PostMessage,
            Capability::PublishAnnouncement,
            Capability::RetractAnnouncement,
            Capability::SubmitCpd,
            Capability::ReviewCpd,
            Capability::RenewCertification,
        ];
        for capability in all {
            assert!(
                !roles_for(capability).is_empty(),
                "{capability:?} has no roles"
            );
        }
    }

    #[test]
    fn test_view_is_wider_than_any_write() {
        let viewers = roles_for(Capability::ViewProject);
        for write in [
            Capability::ToggleOperationalItem,
            Capability::ToggleQualityItem,
            Capability::SubmitDocument,
            Capability::AdvancePhase,
        ] {
            for role in roles_for(write) {
                assert!(viewers.contains(role));
            }
            assert!(roles_for(write).len() < viewers.len());
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("glab_assessor".parse::<Role>(), Ok(Role::GlabAssessor));
        assert!("superuser".parse::<Role>().is_err());
        assert!(Role::GeaStaff.is_gea());
        assert!(Role::GlabAdmin.is_glab());
    }
}
