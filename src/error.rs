//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl AppError {
    /// Status code and machine-readable code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::MissingHeader(_) => (StatusCode::BAD_REQUEST, "missing_header"),
            AppError::Domain(domain_err) => match domain_err {
                // 400 Bad Request
                DomainError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
                DomainError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),

                // 403 Forbidden
                DomainError::SelfPurchaseForbidden { .. } => {
                    (StatusCode::FORBIDDEN, "self_purchase_forbidden")
                }

                // 404 Not Found
                DomainError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
                DomainError::AssetNotFound(_) => (StatusCode::NOT_FOUND, "asset_not_found"),

                // 409 Conflict
                DomainError::AlreadyPurchased { .. } => (StatusCode::CONFLICT, "already_purchased"),
                DomainError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
                DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),

                // 422 Unprocessable Entity
                DomainError::InsufficientFunds { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds")
                }

                // 503 Service Unavailable, retryable
                DomainError::TransactionFailed(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "transaction_failed")
                }
                DomainError::StoreUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let details = match &self {
            AppError::InvalidRequest(msg) | AppError::MissingHeader(msg) => Some(msg.clone()),
            // Store failure details stay in the logs
            AppError::Domain(DomainError::TransactionFailed(_))
            | AppError::Domain(DomainError::StoreUnavailable(_)) => None,
            AppError::Domain(domain_err) => Some(domain_err.to_string()),
        };

        let error = match &self {
            AppError::Domain(domain_err) if domain_err.is_retryable() => {
                "Temporarily unable to complete the request, retry later".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
