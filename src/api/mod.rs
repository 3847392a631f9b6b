//! REST API
//!
//! Thin axum layer over the portal services. Every route except `/health`
//! runs behind [`auth::authenticate`], which resolves the acting user.

pub mod auth;
mod collab_routes;
mod cpd_routes;
mod directory_routes;
pub mod error;
mod notification_routes;
mod project_routes;
mod template_routes;

use axum::{
    body::Bytes,
    extract::DefaultBodyLimit,
    http::header,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::collab::CollabService;
use crate::blob_store::sanitize_filename;
use crate::cpd::CpdService;
use crate::directory::DirectoryService;
use crate::notify::NotificationDispatcher;
use crate::store::PortalStore;
use crate::templates::TemplateLibrary;
use crate::workflow::PhaseWorkflowEngine;

pub use auth::{CurrentUser, USER_HEADER};
pub use error::{ApiError, ApiResult};

/// Shared services handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PortalStore>,
    pub engine: Arc<PhaseWorkflowEngine>,
    pub notifier: Arc<NotificationDispatcher>,
    pub collab: Arc<CollabService>,
    pub cpd: Arc<CpdService>,
    pub directory: Arc<DirectoryService>,
    pub templates: Arc<TemplateLibrary>,
    pub max_upload_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let authenticated = Router::new()
        .merge(project_routes::routes())
        .merge(collab_routes::routes())
        .merge(notification_routes::routes())
        .merge(cpd_routes::routes())
        .merge(directory_routes::routes())
        .merge(template_routes::routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "gea-portal" }))
}

/// JSON body that may be omitted entirely. An empty body yields the default;
/// a body that is present must parse.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))
}

/// File download response
pub(crate) fn attachment(filename: &str, content: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", sanitize_filename(filename));
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response()
}
