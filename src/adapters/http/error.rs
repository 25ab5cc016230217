//! Mapping of domain errors onto HTTP responses.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let (status, code) = match &err {
            DomainError::ValidationFailed(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            DomainError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            DomainError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            DomainError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            DomainError::EscrowNotFound(_) => (StatusCode::NOT_FOUND, "ESCROW_NOT_FOUND"),
            DomainError::SummonNotFound(_) => (StatusCode::NOT_FOUND, "SUMMON_NOT_FOUND"),
            DomainError::MessageNotFound(_) => (StatusCode::NOT_FOUND, "MESSAGE_NOT_FOUND"),
            DomainError::AlreadyLinked { .. } => (StatusCode::CONFLICT, "ALREADY_LINKED"),
            DomainError::EscrowMismatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "ESCROW_MISMATCH"),
            DomainError::AlreadyBacked { .. } => (StatusCode::CONFLICT, "ALREADY_BACKED"),
            DomainError::NotPending { .. } => (StatusCode::CONFLICT, "NOT_PENDING"),
            DomainError::InvalidStateTransition { .. } => (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION"),
            DomainError::SessionNotActive(_) => (StatusCode::CONFLICT, "SESSION_NOT_ACTIVE"),
            DomainError::ConcurrencyConflict { .. } => (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT"),
            DomainError::DependencyUnavailable(_)
            | DomainError::DatabaseError(_)
            | DomainError::SerializationError(_) => {
                tracing::error!(error = %err, "request failed");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "internal error");
            }
        };
        Self::new(status, code, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_BODY", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_PATH", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}
