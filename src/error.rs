// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::codec::CodecError;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Upstream answered 429. Callers decide whether to abort the batch.
    #[error("Strava rate limit exceeded")]
    RateLimited,

    /// Upstream rejected the credential (401 or failed refresh).
    #[error("Strava authorization revoked or invalid: {0}")]
    TokenRevoked(String),

    #[error("Strava API error: {0}")]
    Upstream(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for the rate-limit kind.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AppError::RateLimited)
    }

    /// True when the user's authorization is no longer usable.
    pub fn is_token_error(&self) -> bool {
        matches!(self, AppError::TokenRevoked(_))
    }

    /// Upstream failures that may succeed if the caller tries again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::RateLimited | AppError::Upstream(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Upstream(e.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", None),
            AppError::TokenRevoked(_) => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Upstream(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Cache(msg) => {
                tracing::error!(error = %msg, "Cache error");
                (StatusCode::INTERNAL_SERVER_ERROR, "cache_error", None)
            }
            AppError::Codec(err) => {
                tracing::error!(error = %err, "Codec error");
                (StatusCode::INTERNAL_SERVER_ERROR, "codec_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
