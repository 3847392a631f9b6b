//! Project workflow routes
//!
//! Checklists, documents, phase reviews, advancement, payments and
//! membership. Handlers translate HTTP to [`PhaseWorkflowEngine`] calls.
//!
//! [`PhaseWorkflowEngine`]: crate::workflow::PhaseWorkflowEngine

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Response},
    routing::{delete, get, post},
    Extension, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::{attachment, optional_json, AppState, CurrentUser};
use crate::models::*;
use crate::workflow::{NewProject, ProjectStatus};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/status", get(project_status))
        .route("/projects/:id/history", get(phase_history))
        .route("/projects/:id/phase-reviews", get(phase_reviews))
        .route("/projects/:id/phase-review", post(set_phase_review))
        .route("/projects/:id/advance", post(advance_phase))
        .route("/projects/:id/override", post(override_phase))
        .route("/projects/:id/payments", post(record_payment))
        .route("/projects/:id/members", get(members).post(assign_member))
        .route(
            "/projects/:id/assessors/:user_id",
            delete(remove_assessor),
        )
        // Checklists
        .route(
            "/projects/:id/checklist",
            get(checklist).post(add_checklist_item),
        )
        .route(
            "/projects/:id/checklist/:item_id/toggle",
            post(toggle_checklist_item),
        )
        .route("/projects/:id/quality-checklist", get(quality_checklist))
        .route(
            "/projects/:id/quality-checklist/:item_id/toggle",
            post(toggle_quality_item),
        )
        // Documents
        .route("/projects/:id/documents", get(documents))
        .route("/projects/:id/documents/:key", post(submit_document))
        .route("/documents/pending", get(pending_reviews))
        .route("/documents/:id/review", post(review_document))
        .route("/documents/:id/download", get(download_document))
}

// ── Request types ──

#[derive(Debug, Deserialize)]
struct PhaseQuery {
    phase: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    outcome: ReviewOutcome,
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AdvanceRequest {
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverrideRequest {
    to_phase: i32,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct PaymentRequest {
    milestone: PaymentMilestone,
    paid_on: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct MemberRequest {
    kind: MemberKind,
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct NewChecklistItemRequest {
    phase: i32,
    item_text: String,
}

#[derive(Debug, Default, Deserialize)]
struct QualityToggleRequest {
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    filename: String,
}

// ── Projects ──

async fn list_projects(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(state.engine.list_projects(&actor).await?))
}

async fn create_project(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Json(input): Json<NewProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = state.engine.create_project(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    Ok(Json(state.engine.get_project(&actor, project_id).await?))
}

async fn project_status(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectStatus>> {
    Ok(Json(state.engine.project_status(&actor, project_id).await?))
}

async fn phase_history(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PhaseLog>>> {
    Ok(Json(state.engine.phase_history(&actor, project_id).await?))
}

async fn phase_reviews(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PhaseReview>>> {
    Ok(Json(state.engine.phase_reviews(&actor, project_id).await?))
}

async fn set_phase_review(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> ApiResult<(StatusCode, Json<PhaseReview>)> {
    let review = state
        .engine
        .set_phase_review(&actor, project_id, req.outcome, req.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn advance_phase(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<Project>> {
    let AdvanceRequest { notes } = optional_json(&body)?;
    Ok(Json(
        state.engine.advance_phase(&actor, project_id, notes).await?,
    ))
}

async fn override_phase(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<OverrideRequest>,
) -> ApiResult<Json<Project>> {
    Ok(Json(
        state
            .engine
            .override_phase(&actor, project_id, req.to_phase, &req.reason)
            .await?,
    ))
}

async fn record_payment(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<Json<Project>> {
    Ok(Json(
        state
            .engine
            .record_payment(&actor, project_id, req.milestone, req.paid_on)
            .await?,
    ))
}

// ── Membership ──

async fn members(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ProjectMember>>> {
    Ok(Json(state.engine.members(&actor, project_id).await?))
}

async fn assign_member(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<MemberRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let engine = &state.engine;
    let assigned = match req.kind {
        MemberKind::Assessor => engine.assign_assessor(&actor, project_id, req.user_id).await?,
        MemberKind::TechnicalExpert => {
            engine.assign_expert(&actor, project_id, req.user_id).await?
        }
        MemberKind::CommitteeMember => {
            engine
                .assign_committee_member(&actor, project_id, req.user_id)
                .await?
        }
    };
    Ok(Json(json!({ "assigned": assigned })))
}

async fn remove_assessor(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .remove_assessor(&actor, project_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Checklists ──

async fn checklist(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Query(q): Query<PhaseQuery>,
) -> ApiResult<Json<Vec<ChecklistItem>>> {
    Ok(Json(
        state.engine.checklist(&actor, project_id, q.phase).await?,
    ))
}

async fn add_checklist_item(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<NewChecklistItemRequest>,
) -> ApiResult<(StatusCode, Json<ChecklistItem>)> {
    let item = state
        .engine
        .add_checklist_item(&actor, project_id, req.phase, &req.item_text)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn toggle_checklist_item(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path((project_id, item_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ChecklistItem>> {
    Ok(Json(
        state
            .engine
            .complete_operational_item(&actor, project_id, item_id)
            .await?,
    ))
}

async fn quality_checklist(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Query(q): Query<PhaseQuery>,
) -> ApiResult<Json<Vec<QualityChecklistItem>>> {
    Ok(Json(
        state
            .engine
            .quality_checklist(&actor, project_id, q.phase)
            .await?,
    ))
}

async fn toggle_quality_item(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path((project_id, item_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> ApiResult<Json<QualityChecklistItem>> {
    let QualityToggleRequest { notes } = optional_json(&body)?;
    Ok(Json(
        state
            .engine
            .complete_quality_item(&actor, project_id, item_id, notes)
            .await?,
    ))
}

// ── Documents ──

async fn documents(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Query(q): Query<PhaseQuery>,
) -> ApiResult<Json<Vec<Document>>> {
    Ok(Json(
        state.engine.documents(&actor, project_id, q.phase).await?,
    ))
}

/// Raw file body; the original filename travels in the query string
async fn submit_document(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path((project_id, key)): Path<(Uuid, String)>,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Document>)> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty upload".into()));
    }
    let document = state
        .engine
        .submit_document(&actor, project_id, &key, &q.filename, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn download_document(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Response> {
    let (document, content) = state.engine.download_document(&actor, document_id).await?;
    Ok(attachment(&document.original_filename, content))
}

async fn pending_reviews(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Document>>> {
    Ok(Json(state.engine.pending_reviews(&actor).await?))
}

async fn review_document(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> ApiResult<Json<Document>> {
    Ok(Json(
        state
            .engine
            .review_document(&actor, document_id, req.outcome, req.notes)
            .await?,
    ))
}
