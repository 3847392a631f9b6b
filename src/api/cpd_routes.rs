//! CPD logs and recertification cycles

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiResult;
use super::{AppState, CurrentUser};
use crate::cpd::{CpdSummary, NewCpdActivity};
use crate::models::{CpdLog, CpdStatus, RecertificationRecord};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cpd", get(list_cpd).post(submit_cpd))
        .route("/cpd/:id/review", post(review_cpd))
        .route("/assessors/:id/cpd-summary", get(summary))
        .route("/assessors/:id/cycles", post(open_cycle))
        .route("/assessors/:id/renew", post(renew))
}

#[derive(Debug, Deserialize)]
struct CpdQuery {
    assessor_id: Option<Uuid>,
    status: Option<CpdStatus>,
}

#[derive(Debug, Deserialize)]
struct CpdReviewRequest {
    approve: bool,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CycleRequest {
    start: NaiveDate,
}

async fn list_cpd(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Query(q): Query<CpdQuery>,
) -> ApiResult<Json<Vec<CpdLog>>> {
    Ok(Json(
        state.cpd.list_cpd(&actor, q.assessor_id, q.status).await?,
    ))
}

async fn submit_cpd(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Json(activity): Json<NewCpdActivity>,
) -> ApiResult<(StatusCode, Json<CpdLog>)> {
    let log = state.cpd.submit_cpd(&actor, activity, None).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn review_cpd(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(cpd_log_id): Path<Uuid>,
    Json(req): Json<CpdReviewRequest>,
) -> ApiResult<Json<CpdLog>> {
    Ok(Json(
        state
            .cpd
            .review_cpd(&actor, cpd_log_id, req.approve, req.notes)
            .await?,
    ))
}

async fn summary(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(assessor_id): Path<Uuid>,
) -> ApiResult<Json<CpdSummary>> {
    Ok(Json(state.cpd.summary(&actor, assessor_id).await?))
}

async fn open_cycle(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(assessor_id): Path<Uuid>,
    Json(req): Json<CycleRequest>,
) -> ApiResult<(StatusCode, Json<RecertificationRecord>)> {
    let record = state.cpd.open_cycle(&actor, assessor_id, req.start).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn renew(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(assessor_id): Path<Uuid>,
    Json(req): Json<CycleRequest>,
) -> ApiResult<Json<RecertificationRecord>> {
    Ok(Json(
        state
            .cpd
            .renew_certification(&actor, assessor_id, req.start)
            .await?,
    ))
}
