//! HTTP mapping of portal errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::error::PortalError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Portal(err) => match err {
                PortalError::NotFound { .. } => StatusCode::NOT_FOUND,
                PortalError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                PortalError::PreconditionNotMet { .. } | PortalError::Conflict(_) => {
                    StatusCode::CONFLICT
                }
                PortalError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PortalError::Storage(_)
                | PortalError::DocumentStorage(_)
                | PortalError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
            return (status, Json(json!({ "error": "Internal server error" }))).into_response();
        }

        let body = match &self {
            Self::Portal(PortalError::PreconditionNotMet { blockers }) => json!({
                "error": self.to_string(),
                "blockers": blockers,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Blocker, BlockerType};

    #[test]
    fn test_status_codes() {
        let cases = [
            (PortalError::not_found("project", "x"), StatusCode::NOT_FOUND),
            (PortalError::denied("no"), StatusCode::FORBIDDEN),
            (PortalError::validation("bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (PortalError::conflict("twice"), StatusCode::CONFLICT),
            (
                PortalError::blocked(Blocker::new(BlockerType::FinalPhaseReached, "done")),
                StatusCode::CONFLICT,
            ),
            (
                PortalError::Storage("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
        assert_eq!(
            ApiError::Unauthorized("who".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
