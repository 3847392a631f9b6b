//! Actor resolution
//!
//! Authentication happens upstream. The authenticating proxy forwards the
//! account as `x-portal-user` (user id or username); this layer resolves it to
//! an active [`User`] and attaches it to the request.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;
use crate::models::User;

pub const USER_HEADER: &str = "x-portal-user";

/// The acting user, inserted into request extensions
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let value = request
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", USER_HEADER)))?;

    let user = match Uuid::parse_str(value) {
        Ok(user_id) => state.store.get_user(user_id).await?,
        Err(_) => state.store.find_user_by_username(value).await?,
    };
    let user = match user {
        Some(user) if user.is_active => user,
        Some(_) => return Err(ApiError::Unauthorized("account is deactivated".into())),
        None => return Err(ApiError::Unauthorized("unknown user".into())),
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
