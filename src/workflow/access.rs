//! Organization scoping on top of the role table
//!
//! `permissions` answers "may this role ever do X". The checks here answer
//! "may this user do X to this project": same GLAB, assigned to the project,
//! or the project's client.

use crate::error::{PortalError, PortalResult};
use crate::models::{MemberKind, Project, User};
use crate::permissions::{allows, Capability, Role};
use crate::store::{PortalStore, ProjectScope};

/// Role gate. Inactive accounts are refused outright.
pub fn require(actor: &User, capability: Capability) -> PortalResult<()> {
    if !actor.is_active {
        return Err(PortalError::denied("Account is deactivated"));
    }
    if !allows(actor.role, capability) {
        return Err(PortalError::denied(format!(
            "Role {} may not {:?}",
            actor.role, capability
        )));
    }
    Ok(())
}

async fn is_member_as(
    store: &dyn PortalStore,
    project: &Project,
    user: &User,
    kind: MemberKind,
) -> PortalResult<bool> {
    Ok(store
        .project_members(project.project_id)
        .await?
        .iter()
        .any(|m| m.user_id == user.user_id && m.kind == kind))
}

/// Read access to a project
pub async fn can_view(
    store: &dyn PortalStore,
    actor: &User,
    project: &Project,
) -> PortalResult<bool> {
    if !actor.is_active {
        return Ok(false);
    }
    match actor.role {
        Role::GeaAdmin | Role::GeaStaff => Ok(true),
        Role::GlabAdmin => Ok(actor.belongs_to_glab(project.glab_id)),
        Role::ClientUser => Ok(actor.client_id == Some(project.client_id)),
        role => match MemberKind::for_role(role) {
            Some(kind) => is_member_as(store, project, actor, kind).await,
            None => Ok(false),
        },
    }
}

pub async fn ensure_can_view(
    store: &dyn PortalStore,
    actor: &User,
    project: &Project,
) -> PortalResult<()> {
    if can_view(store, actor, project).await? {
        Ok(())
    } else {
        Err(PortalError::denied(format!(
            "No access to project {}",
            project.reference_number
        )))
    }
}

/// The operating side of a project: its GLAB's admin, or an assessor
/// assigned to it
pub async fn ensure_operator(
    store: &dyn PortalStore,
    actor: &User,
    project: &Project,
) -> PortalResult<()> {
    let operator = match actor.role {
        Role::GlabAdmin => actor.belongs_to_glab(project.glab_id),
        Role::GlabAssessor => {
            actor.belongs_to_glab(project.glab_id)
                && is_member_as(store, project, actor, MemberKind::Assessor).await?
        }
        _ => false,
    };
    if operator {
        Ok(())
    } else {
        Err(PortalError::denied(format!(
            "{} is not operating project {}",
            actor.username, project.reference_number
        )))
    }
}

/// GEA roles act on any project; a GLAB admin only on its own GLAB's
pub fn ensure_gea_or_own_glab_admin(actor: &User, project: &Project) -> PortalResult<()> {
    if actor.role.is_gea()
        || (actor.role == Role::GlabAdmin && actor.belongs_to_glab(project.glab_id))
    {
        Ok(())
    } else {
        Err(PortalError::denied(format!(
            "{} does not manage project {}",
            actor.username, project.reference_number
        )))
    }
}

/// Listing scope for a user's project list. `None` means nothing is visible.
pub fn project_scope(actor: &User) -> Option<ProjectScope> {
    if !actor.is_active {
        return None;
    }
    match actor.role {
        Role::GeaAdmin | Role::GeaStaff => Some(ProjectScope::All),
        Role::GlabAdmin => actor.glab_id.map(ProjectScope::Glab),
        Role::ClientUser => actor.client_id.map(ProjectScope::Client),
        Role::GlabAssessor | Role::TechnicalExpert | Role::CertCommittee => {
            Some(ProjectScope::Member(actor.user_id))
        }
    }
}
