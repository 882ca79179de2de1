//! Error Types for the Concord API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum mapping engine failures onto HTTP statuses
//! - IntoResponse implementation wrapping errors as `{ "success": false, "error": ... }`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use concord_core::{ConcordError, ConflictError, LockError, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request body or path could not be parsed
    InvalidInput,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Sync operation is neither in flight nor in recent history
    SyncNotFound,

    /// Conflict id is unknown
    ConflictNotFound,

    // ========================================================================
    // Conflict Errors (409, 422)
    // ========================================================================
    /// Memory lock could not be acquired; safe to retry
    LockUnavailable,

    /// Policy chain could not decide; conflict is awaiting manual review
    ConflictUnresolved,

    /// Conflict was already resolved
    ConflictAlreadyResolved,

    /// Content merge failed
    MergeFailure,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Memory store rejected the write
    StorageError,

    /// Engine configuration is invalid
    ConfigurationError,

    /// A backing store is unreachable
    ServiceUnavailable,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::SyncNotFound | ErrorCode::ConflictNotFound => StatusCode::NOT_FOUND,

            ErrorCode::LockUnavailable
            | ErrorCode::ConflictUnresolved
            | ErrorCode::ConflictAlreadyResolved => StatusCode::CONFLICT,

            ErrorCode::MergeFailure => StatusCode::UNPROCESSABLE_ENTITY,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::StorageError
            | ErrorCode::ConfigurationError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::SyncNotFound => "Sync operation not found",
            ErrorCode::ConflictNotFound => "Conflict not found",
            ErrorCode::LockUnavailable => "Memory lock unavailable",
            ErrorCode::ConflictUnresolved => "Conflict requires manual review",
            ErrorCode::ConflictAlreadyResolved => "Conflict already resolved",
            ErrorCode::MergeFailure => "Content merge failed",
            ErrorCode::StorageError => "Memory store operation failed",
            ErrorCode::ConfigurationError => "Invalid configuration",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
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

/// Structured error returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Engine error category (`validation_error`, `lock_unavailable`, ...)
    pub kind: String,

    /// Human-readable error message
    pub message: String,

    /// Sync id / conflict id metadata, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

/// Envelope for error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ApiError,
}

impl ApiError {
    pub fn new(code: ErrorCode, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: kind.into(),
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
        Self::new(ErrorCode::InvalidInput, "validation_error", message)
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::invalid_input(format!(
            "Field '{}' has invalid format, expected {}",
            field, expected
        ))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, "internal_error", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, "lock_unavailable", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "request failed");
        }
        let body = Json(ErrorResponse {
            success: false,
            error: self,
        });
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM ENGINE ERRORS
// ============================================================================

impl From<ConcordError> for ApiError {
    fn from(err: ConcordError) -> Self {
        let code = match &err {
            ConcordError::Validation(_) => ErrorCode::ValidationFailed,
            ConcordError::SyncNotFound { .. } => ErrorCode::SyncNotFound,
            ConcordError::Conflict(ConflictError::NotFound { .. }) => ErrorCode::ConflictNotFound,
            ConcordError::Conflict(ConflictError::AlreadyResolved { .. }) => {
                ErrorCode::ConflictAlreadyResolved
            }
            ConcordError::Conflict(_) => ErrorCode::ConflictUnresolved,
            ConcordError::Lock(LockError::Unavailable { .. }) => ErrorCode::LockUnavailable,
            ConcordError::Lock(_) => ErrorCode::InternalError,
            ConcordError::Storage(StorageError::Unreachable { .. }) => {
                ErrorCode::ServiceUnavailable
            }
            ConcordError::Storage(_) => ErrorCode::StorageError,
            ConcordError::Merge(_) => ErrorCode::MergeFailure,
            ConcordError::Config(_) => ErrorCode::ConfigurationError,
        };

        let mut details = serde_json::Map::new();
        if let Some(sync_id) = err.sync_id() {
            details.insert("syncId".to_string(), json!(sync_id));
        }
        if let Some(conflict_id) = err.conflict_id() {
            details.insert("conflictId".to_string(), json!(conflict_id));
        }
        details.insert("retryable".to_string(), json!(err.is_retryable()));

        ApiError::new(code, err.kind(), err.to_string())
            .with_details(serde_json::Value::Object(details))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_format("id", &format!("valid UUID: {}", err))
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{new_entity_id, ValidationError};

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::SyncNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::LockUnavailable.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::MergeFailure.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            ErrorCode::ServiceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_engine_error_conversion_carries_metadata() {
        let sync_id = new_entity_id();
        let conflict_id = new_entity_id();
        let err: ApiError = ConcordError::from(ConflictError::Unresolved {
            conflict_id,
            sync_id,
            reason: "malformed".to_string(),
        })
        .into();

        assert_eq!(err.code, ErrorCode::ConflictUnresolved);
        assert_eq!(err.kind, "conflict_unresolved");
        let details = err.details.unwrap();
        assert_eq!(details["conflictId"], json!(conflict_id));
        assert_eq!(details["syncId"], json!(sync_id));
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: ApiError = ConcordError::from(ValidationError::UnknownAgent {
            agent_id: "rogue".to_string(),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind, "validation_error");
        assert!(err.message.contains("rogue"));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::invalid_input("bad body");
        let json = serde_json::to_string(&err)?;
        assert!(json.contains("INVALID_INPUT"));
        assert!(json.contains("validation_error"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }
}
