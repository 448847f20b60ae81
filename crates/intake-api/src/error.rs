//! Error types for the intake API.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use database::{DatabaseError, ValidationErrors};
use thiserror::Error;

use crate::state::AppState;
use crate::storage::StorageError;

/// Message returned in place of internal error detail.
pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// Errors that can occur while handling a request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Submitted data failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    /// Malformed request (bad JSON, bad query string, bad upload).
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate record or disallowed status change.
    #[error("{0}")]
    Conflict(String),

    /// Upload rejected or not written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            DatabaseError::AlreadyExists { .. } | DatabaseError::InvalidTransition { .. } => {
                ApiError::Conflict(err.to_string())
            }
            DatabaseError::Validation(errors) => ApiError::Validation(errors),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

/// Internal failure detail, attached to 500 responses for
/// [`expose_error_detail`].
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut detail = None;
        let (status, message, errors) = match self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                Some(errors.to_fields()),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::Storage(StorageError::Io(err)) => {
                tracing::error!("Storage error: {}", err);
                detail = Some(err.to_string());
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string(), None)
            }
            ApiError::Storage(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                detail = Some(msg);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string(), None)
            }
        };

        let mut body = serde_json::json!({
            "success": false,
            "message": message,
        });
        if let Some(errors) = errors {
            body["errors"] = serde_json::json!(errors);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}

/// In development, add the internal detail of a 500 response to its body.
pub async fn expose_error_detail(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !state.config.app_env.is_development() {
        return response;
    }

    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let body = serde_json::json!({
        "success": false,
        "message": INTERNAL_MESSAGE,
        "error": detail,
    });
    (response.status(), Json(body)).into_response()
}

/// Result type for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
