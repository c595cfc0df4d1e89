//! API error handling
//!
//! Author: hephaex@gmail.com

use crate::auth::SessionError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn rate_limited() -> Self {
        Self::new("RATE_LIMITED", "Too many requests")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Malformed or rejected input (400)
    BadRequest(ApiError),
    /// Conflicts with existing state (409)
    Conflict(ApiError),
    /// Missing or rejected credentials (401)
    Unauthorized(ApiError),
    /// Client exceeded its request budget (429)
    RateLimited,
    /// Detail is logged, never returned (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            AppError::Conflict(e) => (StatusCode::CONFLICT, e),
            AppError::Unauthorized(e) => (StatusCode::UNAUTHORIZED, e),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, ApiError::rate_limited()),
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::InvalidEmail => {
                AppError::BadRequest(ApiError::new("INVALID_EMAIL", message))
            }
            SessionError::WeakPassword(_) => {
                AppError::BadRequest(ApiError::new("WEAK_PASSWORD", message))
            }
            SessionError::AccountExists => {
                AppError::Conflict(ApiError::new("ACCOUNT_EXISTS", message))
            }
            SessionError::InvalidCredentials => {
                AppError::Unauthorized(ApiError::new("INVALID_CREDENTIALS", message))
            }
            SessionError::InvalidRefreshToken => {
                AppError::Unauthorized(ApiError::new("INVALID_REFRESH_TOKEN", message))
            }
            SessionError::InvalidAccessToken => {
                AppError::Unauthorized(ApiError::new("INVALID_ACCESS_TOKEN", message))
            }
            SessionError::Infrastructure(detail) => AppError::Internal(detail),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(ApiError::new("INVALID_REQUEST", rejection.body_text()))
    }
}
