//! Phase Workflow Engine
//!
//! Drives a project through the six phases. Advancement requires both the
//! operating GLAB's required checklist items and an approving GEA phase
//! review; every failed precondition is reported as a blocker.
//!
//! ```text
//! ┌─────────────┐  toggle   ┌──────────────────────┐
//! │ GLAB roles  │──────────▶│ operational checklist │──┐
//! └─────────────┘           └──────────────────────┘  │  advance_phase
//! ┌─────────────┐  review   ┌──────────────────────┐  ├──────────────▶ phase + 1
//! │ GEA roles   │──────────▶│ phase review          │──┘
//! └─────────────┘           └──────────────────────┘
//! ```

pub mod access;
mod engine;
mod status;

pub use engine::PhaseWorkflowEngine;
pub use status::{ChecklistProgress, ProjectStatus, QualityProgress};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AssessmentType;

/// Upload limit when none is configured (50 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Client fees are stored as NUMERIC(14,2)
pub const CLIENT_FEE_SCALE: u32 = 2;

/// Largest client fee the fee column holds
pub const MAX_CLIENT_FEE: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// Input for `create_project`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    /// Required for GEA users; GLAB admins always create in their own GLAB
    pub glab_id: Option<Uuid>,
    pub client_id: Uuid,
    pub assessment_type: AssessmentType,
    pub client_fee: Decimal,
}
