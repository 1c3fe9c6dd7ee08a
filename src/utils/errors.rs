//! Error handling
//!
//! `StoreError` is what every repository backend returns. `AppError` is the
//! HTTP-facing error and owns the mapping to status codes and JSON bodies.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

/// Errors produced by the truck repositories
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Truck with plate number '{0}' already exists")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type shared by the repositories
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Logs an infrastructure failure with the operation and key that caused
    /// it, and hides the detail behind a generic backend error.
    pub fn backend(operation: &str, key: &str, err: impl std::fmt::Display) -> Self {
        error!(operation, key, error = %err, "Repository operation failed");
        StoreError::Backend(format!("{} failed", operation))
    }
}

/// Main application errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid JSON body: {0}")]
    Json(#[from] JsonRejection),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error body returned by the API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    code: String,
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => AppError::BadRequest(msg),
            StoreError::DuplicateKey(plate) => AppError::DuplicateKey(format!(
                "Truck with plate number '{}' already exists",
                plate
            )),
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            AppError::Validation(e) => {
                warn!("Validation error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: "Validation Error".to_string(),
                        message: "Missing or invalid required fields".to_string(),
                        details: serde_json::to_value(&e).ok(),
                        code: "VALIDATION_ERROR".to_string(),
                    },
                )
            }

            AppError::BadRequest(msg) => {
                warn!("Bad request: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: "Bad Request".to_string(),
                        message: msg,
                        details: None,
                        code: "BAD_REQUEST".to_string(),
                    },
                )
            }

            AppError::DuplicateKey(msg) => {
                warn!("Duplicate key: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: "Duplicate Key".to_string(),
                        message: msg,
                        details: None,
                        code: "DUPLICATE_KEY".to_string(),
                    },
                )
            }

            AppError::NotFound(msg) => {
                warn!("Resource not found: {}", msg);
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse {
                        error: "Not Found".to_string(),
                        message: msg,
                        details: None,
                        code: "NOT_FOUND".to_string(),
                    },
                )
            }

            AppError::Json(rejection) => {
                warn!("Rejected request body: {}", rejection);
                (
                    rejection.status(),
                    ErrorResponse {
                        error: "Invalid Body".to_string(),
                        message: rejection.body_text(),
                        details: None,
                        code: "INVALID_BODY".to_string(),
                    },
                )
            }

            // Detail has already been logged where it happened.
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "Internal Server Error".to_string(),
                        message: "An unexpected error occurred".to_string(),
                        details: None,
                        code: "INTERNAL_ERROR".to_string(),
                    },
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Typed result for handlers
pub type AppResult<T> = Result<T, AppError>;

/// Helper for a truck that does not exist
pub fn truck_not_found(plate_number: &str) -> StoreError {
    StoreError::NotFound(format!("Truck with ID {} not found", plate_number))
}
