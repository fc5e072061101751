//! Error types for the SYLLAB API
//!
//! `ApiError` is the structured error envelope every endpoint returns on
//! failure; `ErrorCode` maps error categories to HTTP status codes. All
//! errors serialize as JSON.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use syllab_core::{EngineError, StoreError, SyllabError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Requested entity does not exist
    EntityNotFound,

    /// Operation conflicts with the job's current state
    StateConflict,

    /// Retry budget for the job is exhausted
    RetryExhausted,

    /// Database operation failed
    DatabaseError,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::MissingField => StatusCode::BAD_REQUEST,
            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::StateConflict | ErrorCode::RetryExhausted => StatusCode::CONFLICT,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::StateConflict => "Operation conflicts with current state",
            ErrorCode::RetryExhausted => "Retry budget exhausted",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field is missing: {}", field),
        )
    }

    pub fn job_not_found(job_id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::EntityNotFound, format!("Job not found: {}", job_id))
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateConflict, message)
    }

    pub fn retry_exhausted(job_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::RetryExhausted,
            format!("Retry budget exhausted for job {}", job_id),
        )
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => ApiError::new(
                ErrorCode::EntityNotFound,
                format!("{} not found: {}", entity, id),
            ),
            err => {
                tracing::error!(error = %err, "store error");
                ApiError::database_error("Database operation failed")
            }
        }
    }
}

impl From<SyllabError> for ApiError {
    fn from(err: SyllabError) -> Self {
        match err {
            SyllabError::Store(err) => err.into(),
            SyllabError::Engine(EngineError::Canceled) => {
                ApiError::state_conflict("Build was canceled")
            }
            err => {
                tracing::error!(error = %err, "engine error");
                ApiError::internal_error(err.to_string())
            }
        }
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_status() {
        assert_eq!(
            ErrorCode::EntityNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ErrorCode::StateConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::RetryExhausted.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(ErrorCode::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        let err: ApiError = StoreError::NotFound {
            entity: "build_job",
            id: uuid::Uuid::nil(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
        assert!(err.message.contains("build_job"));
    }

    #[test]
    fn test_details_skipped_when_absent() {
        let json = serde_json::to_value(ApiError::missing_field("topic")).unwrap();
        assert!(json.get("details").is_none());
        assert_eq!(json["code"], "MISSING_FIELD");
    }
}
