//! Error types for the regeneration endpoint.
//!
//! [`ApiError`] unifies all failure modes into a single enum that converts
//! into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. The body
//! is always `{ "error": message, "status": code }`.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use regen_core::RegenerationError;

/// Seconds a client should wait before retrying a contended request.
const CONTENTION_RETRY_AFTER_SECS: u64 = 1;

/// Errors that can occur in the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The path did not carry a valid fid.
    #[error("invalid fid: {0}")]
    InvalidFid(String),

    /// The requested user has no balance record.
    #[error("not found: {0}")]
    NotFound(String),

    /// The balance is being updated by other requests; retry shortly.
    #[error("{0}")]
    Contention(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RegenerationError> for ApiError {
    fn from(err: RegenerationError) -> Self {
        match err {
            RegenerationError::Contention { .. } => Self::Contention(err.to_string()),
            RegenerationError::Store(_) | RegenerationError::Accrual(_) => {
                tracing::error!(error = %err, "Regeneration failed");
                Self::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidFid(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Contention(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        let mut response = (status, axum::Json(body)).into_response();
        if matches!(self, Self::Contention(_)) {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(CONTENTION_RETRY_AFTER_SECS),
            );
        }
        response
    }
}
