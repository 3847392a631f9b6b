//! Users, GLABs and clients

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
use crate::directory::{NewClient, NewGlab, NewUser};
use crate::models::{Client, Glab, GlabStatus, LicenseType, User};
use crate::permissions::Role;
use crate::store::UserQuery;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/me/email-notifications", post(set_email_notifications))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/active", post(set_user_active))
        .route("/glabs", get(list_glabs).post(create_glab))
        .route("/glabs/:id", get(get_glab))
        .route("/glabs/:id/status", post(set_glab_status))
        .route("/glabs/:id/license", post(renew_license))
        .route("/glabs/:id/payments", post(record_license_payment))
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/:id", get(get_client))
}

#[derive(Debug, Deserialize)]
struct UserListQuery {
    role: Option<Role>,
    glab_id: Option<Uuid>,
    #[serde(default)]
    active_only: bool,
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: GlabStatus,
}

#[derive(Debug, Deserialize)]
struct LicenseRequest {
    license_type: LicenseType,
    start: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct LicensePaymentRequest {
    paid_on: NaiveDate,
}

// ── Users ──

async fn me(Extension(CurrentUser(actor)): Extension<CurrentUser>) -> Json<User> {
    Json(actor)
}

async fn set_email_notifications(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(
        state
            .directory
            .set_email_notifications(&actor, req.enabled)
            .await?,
    ))
}

async fn list_users(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Query(q): Query<UserListQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let query = UserQuery {
        roles: q.role.into_iter().collect(),
        glab_id: q.glab_id,
        active_only: q.active_only,
    };
    Ok(Json(state.directory.list_users(&actor, query).await?))
}

async fn create_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Json(input): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.directory.create_user(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn set_user_active(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(
        state
            .directory
            .set_user_active(&actor, user_id, req.enabled)
            .await?,
    ))
}

// ── GLABs ──

async fn list_glabs(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Glab>>> {
    Ok(Json(state.directory.list_glabs(&actor).await?))
}

async fn create_glab(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Json(input): Json<NewGlab>,
) -> ApiResult<(StatusCode, Json<Glab>)> {
    let glab = state.directory.create_glab(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(glab)))
}

async fn get_glab(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(glab_id): Path<Uuid>,
) -> ApiResult<Json<Glab>> {
    Ok(Json(state.directory.get_glab(&actor, glab_id).await?))
}

async fn set_glab_status(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(glab_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Json<Glab>> {
    Ok(Json(
        state
            .directory
            .set_glab_status(&actor, glab_id, req.status)
            .await?,
    ))
}

async fn renew_license(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(glab_id): Path<Uuid>,
    Json(req): Json<LicenseRequest>,
) -> ApiResult<Json<Glab>> {
    Ok(Json(
        state
            .directory
            .renew_license(&actor, glab_id, req.license_type, req.start)
            .await?,
    ))
}

async fn record_license_payment(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(glab_id): Path<Uuid>,
    Json(req): Json<LicensePaymentRequest>,
) -> ApiResult<Json<Glab>> {
    Ok(Json(
        state
            .directory
            .record_license_payment(&actor, glab_id, req.paid_on)
            .await?,
    ))
}

// ── Clients ──

async fn list_clients(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Client>>> {
    Ok(Json(state.directory.list_clients(&actor).await?))
}

async fn create_client(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Json(input): Json<NewClient>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let client = state.directory.create_client(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

async fn get_client(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(client_id): Path<Uuid>,
) -> ApiResult<Json<Client>> {
    Ok(Json(state.directory.get_client(&actor, client_id).await?))
}
