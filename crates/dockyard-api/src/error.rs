//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Conflict(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Internal(msg) => msg,
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<dockyard_core::Error> for ApiError {
    fn from(err: dockyard_core::Error) -> Self {
        match err {
            dockyard_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            dockyard_core::Error::InvalidSpec(msg) => ApiError::BadRequest(msg),
            dockyard_core::Error::SourceControl(msg) => ApiError::BadGateway(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<dockyard_db::DbError> for ApiError {
    fn from(err: dockyard_db::DbError) -> Self {
        match err {
            dockyard_db::DbError::NotFound(msg) => ApiError::NotFound(msg),
            dockyard_db::DbError::Duplicate(msg) => ApiError::Conflict(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<dockyard_github::GitHubError> for ApiError {
    fn from(err: dockyard_github::GitHubError) -> Self {
        match err {
            dockyard_github::GitHubError::Payload(msg) => ApiError::BadRequest(msg),
            other => dockyard_core::Error::from(other).into(),
        }
    }
}
