//! Unified API error handling with structured responses.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::query::QueryError;
use crate::user::UserError;

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Duplicate email.
    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// Role already held by the user.
    #[error("Locked: {0}")]
    Locked(String),

    /// A create request broke a field rule.
    #[error("Failed dependency: {0}")]
    FailedDependency(String),

    /// Requested page lies past the end of the result set.
    #[error("Too early: {0}")]
    TooEarly(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Locked(_) => StatusCode::LOCKED,
            Self::FailedDependency(_) => StatusCode::FAILED_DEPENDENCY,
            Self::TooEarly(_) => {
                StatusCode::from_u16(425).unwrap_or(StatusCode::RANGE_NOT_SATISFIABLE)
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
            Self::Locked(_) => "LOCKED",
            Self::FailedDependency(_) => "FAILED_DEPENDENCY",
            Self::TooEarly(_) => "TOO_EARLY",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[schema(value_type = String, example = "NOT_FOUND")]
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        match &self {
            ApiError::Internal(msg) => {
                error!(error_code = code, message = %msg, "API error");
            }
            _ => {
                debug!(error_code = code, message = %message, "Client error");
            }
        }

        let body = ErrorResponse {
            error: message,
            code,
        };

        (status, Json(body)).into_response()
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        let msg = err.to_string();
        match err {
            UserError::Validation(_) => ApiError::BadRequest(msg),
            UserError::FieldRule(_) => ApiError::FailedDependency(msg),
            UserError::Query(QueryError::PageOutOfRange { .. }) => ApiError::TooEarly(msg),
            UserError::Query(_) => ApiError::BadRequest(msg),
            UserError::UserNotFound(_) | UserError::RoleNotFound(_) => ApiError::NotFound(msg),
            UserError::EmailTaken(_) => ApiError::UnprocessableEntity(msg),
            UserError::RoleAlreadyAssigned(_) => ApiError::Locked(msg),
            UserError::Storage(_) => ApiError::Internal(msg),
        }
    }
}

/// Malformed or mistyped JSON bodies are structural failures.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Missing or unparsable query parameters are structural failures.
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
