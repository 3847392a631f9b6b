//! Project chat and announcements

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Extension, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiResult;
use super::{AppState, CurrentUser};
use crate::collab::NewAnnouncement;
use crate::models::{Announcement, ChatMessage};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:id/messages",
            get(list_messages).post(post_message),
        )
        .route(
            "/announcements",
            get(list_announcements).post(publish_announcement),
        )
        .route("/announcements/:id", delete(retract_announcement))
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
    since: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    body: String,
}

/// Polled by clients; `since` returns only newer messages
async fn list_messages(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Query(q): Query<SinceQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(
        state
            .collab
            .list_messages(&actor, project_id, q.since)
            .await?,
    ))
}

async fn post_message(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<MessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let message = state
        .collab
        .post_message(&actor, project_id, &req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_announcements(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Announcement>>> {
    Ok(Json(state.collab.announcements_for(&actor).await?))
}

async fn publish_announcement(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Json(input): Json<NewAnnouncement>,
) -> ApiResult<(StatusCode, Json<Announcement>)> {
    let announcement = state.collab.publish_announcement(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

async fn retract_announcement(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(announcement_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .collab
        .retract_announcement(&actor, announcement_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
