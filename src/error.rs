//! Coordinator-wide error taxonomy.
//!
//! Every caller-facing failure maps to one of: validation, authentication,
//! authorization, not-found, conflict, or an opaque internal fault. No
//! variant carries a store key, stack trace, or other implementation
//! detail into its `Display` output.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal failure")]
    Internal(#[from] anyhow::Error),
}

impl CoordinatorError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            CoordinatorError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            CoordinatorError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            CoordinatorError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            CoordinatorError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            CoordinatorError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            CoordinatorError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal"),
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Internal faults are logged with full detail but never echoed to the caller.
        if let CoordinatorError::Internal(ref source) = self {
            tracing::error!(error = %source, "internal failure");
            return (
                status,
                Json(json!({ "success": false, "error": code, "message": "internal error" })),
            )
                .into_response();
        }

        let message = self.to_string();
        (
            status,
            Json(json!({ "success": false, "error": code, "message": message })),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
