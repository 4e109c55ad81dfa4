//! Error taxonomy shared by services and handlers
//!
//! Validation errors reject input before the store is touched; conflicts are
//! the non-fatal "try another" results of losing a claim/accept race;
//! rate-limited carries the OTP cool-down remainder; upstream wraps failures
//! of the payment/account/notification collaborators.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, TransactionError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited: retry in {0} seconds")]
    RateLimited(i64),

    #[error("upstream dependency failed: {0}")]
    Upstream(String),

    #[error("database error")]
    Database(#[from] DbErr),
}

impl From<TransactionError<DispatchError>> for DispatchError {
    fn from(err: TransactionError<DispatchError>) -> Self {
        match err {
            TransactionError::Connection(e) => DispatchError::Database(e),
            TransactionError::Transaction(e) => e,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<i64>,
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, error_type, retry_after) = match &self {
            DispatchError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            DispatchError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error", None),
            DispatchError::Conflict(_) => (StatusCode::CONFLICT, "conflict", None),
            DispatchError::RateLimited(secs) => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited", Some(*secs))
            }
            DispatchError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error", None),
            DispatchError::Database(err) => {
                // Log internals, respond opaquely
                tracing::error!(error = ?err, "Database error");
                let body = ErrorResponse {
                    error: "internal_error".to_string(),
                    message: "An internal error occurred".to_string(),
                    retry_after_secs: None,
                };
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            retry_after_secs: retry_after,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
