//! Phase template routes

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Response},
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::{attachment, AppState, CurrentUser};
use crate::models::PhaseTemplate;
use crate::templates::NewTemplate;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/templates", get(list_templates).post(upload_template))
        .route("/templates/:id/download", get(download_template))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    phase: Option<i32>,
    #[serde(default)]
    include_retired: bool,
}

#[derive(Debug, Deserialize)]
struct TemplateUploadQuery {
    phase: i32,
    key: String,
    filename: String,
    name: Option<String>,
}

async fn list_templates(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Vec<PhaseTemplate>>> {
    Ok(Json(
        state
            .templates
            .list(&actor, q.phase, q.include_retired)
            .await?,
    ))
}

/// Raw file body; slot and filename travel in the query string
async fn upload_template(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Query(q): Query<TemplateUploadQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<PhaseTemplate>)> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty upload".into()));
    }
    let input = NewTemplate {
        phase_number: q.phase,
        document_key: q.key,
        template_name: q.name,
    };
    let template = state
        .templates
        .upload(&actor, input, &q.filename, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn download_template(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(template_id): Path<Uuid>,
) -> ApiResult<Response> {
    let (template, content) = state.templates.download(&actor, template_id).await?;
    Ok(attachment(&template.original_filename, content))
}
