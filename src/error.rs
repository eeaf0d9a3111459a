//! Application error type and HTTP response mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced by the engine and the request layer.
///
/// Business-rule failures (`NotFound`, `Conflict`, `InsufficientFunds`,
/// `Gone`) are expected outcomes and map to distinct status codes; storage
/// failures collapse to a generic 500 without leaking driver detail.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A debit would drive a reseller balance below zero.
    #[error("insufficient balance")]
    InsufficientFunds,

    /// The resource existed but is no longer consumable (expired/revoked).
    #[error("gone: {0}")]
    Gone(String),

    /// A required capability (e.g. Telegram) is not configured.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A signed payload failed verification.
    #[error("invalid signature")]
    SignatureInvalid,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::InsufficientFunds => {
                (StatusCode::PAYMENT_REQUIRED, "insufficient_balance")
            }
            AppError::Gone(_) => (StatusCode::GONE, "gone"),
            AppError::Unavailable(_) => (StatusCode::NOT_IMPLEMENTED, "not_supported"),
            AppError::SignatureInvalid => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    /// Message safe to return to clients. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Serialization(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": code,
            "message": self.public_message(),
        }));

        (status, body).into_response()
    }
}
