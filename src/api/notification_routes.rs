//! Notification inbox

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde_json::json;
use uuid::Uuid;

use super::error::ApiResult;
use super::{AppState, CurrentUser};
use crate::models::Notification;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(inbox))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/mark-all-read", post(mark_all_read))
        .route("/notifications/:id/read", post(mark_read))
}

async fn inbox(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.notifier.inbox(actor.user_id).await?))
}

async fn unread_count(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.notifier.unread_count(actor.user_id).await?;
    Ok(Json(json!({ "count": count })))
}

async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .notifier
        .mark_read(actor.user_id, notification_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn mark_all_read(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let marked = state.notifier.mark_all_read(actor.user_id).await?;
    Ok(Json(json!({ "success": true, "marked": marked })))
}
