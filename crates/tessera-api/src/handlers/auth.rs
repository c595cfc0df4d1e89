//! Authentication API handlers
//!
//! Provides HTTP endpoints for the session lifecycle: register, login,
//! refresh, logout, and the current account.
//!
//! Author: hephaex@gmail.com

use crate::audit::{client_ip, extract_user_agent};
use crate::auth::{
    bearer_token, AuthResponse, AuthenticatedAccount, ClientContext, LoginRequest,
    RefreshRequest, RegisterRequest, SessionError,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tessera_core::models::AccountPublic;

/// Client address and user agent of the current request
fn client_context(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> ClientContext {
    ClientContext::new(
        client_ip(headers, peer.map(|ConnectInfo(addr)| addr)),
        extract_user_agent(headers),
    )
}

/// Register a new account
///
/// Creates the account and opens its first session.
///
/// # Request Body
///
/// * `email` - Valid email address (unique, case-insensitive)
/// * `password` - 8 to 64 characters with uppercase, lowercase, digit and special character
///
/// # Responses
///
/// * `201 Created` - Account registered, returns tokens
/// * `400 Bad Request` - Invalid email or weak password
/// * `409 Conflict` - Email already registered
/// * `500 Internal Server Error` - Server error
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Account already exists", body = crate::error::ApiError),
        (status = 429, description = "Too many requests", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let client = client_context(&headers, peer);

    let response = state
        .session
        .register(&request.email, &request.password, &client)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Login with email and password
///
/// # Responses
///
/// * `200 OK` - Authentication successful, returns tokens
/// * `401 Unauthorized` - Invalid credentials
/// * `500 Internal Server Error` - Server error
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Malformed request", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 429, description = "Too many requests", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let client = client_context(&headers, peer);

    let response = state
        .session
        .login(&request.email, &request.password, &client)
        .await?;

    Ok(Json(response))
}

/// Exchange a refresh token for a new token pair
///
/// The presented refresh token is revoked and replaced. Presenting a token
/// that was already used revokes every session of the account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = AuthResponse),
        (status = 401, description = "Invalid refresh token", body = crate::error::ApiError),
        (status = 429, description = "Too many requests", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let client = client_context(&headers, peer);

    let response = state
        .session
        .refresh(&request.refresh_token, &client)
        .await?;

    Ok(Json(response))
}

/// Logout from every device
///
/// Revokes all refresh tokens of the account named by the bearer access
/// token. Access tokens already issued stay valid until they expire.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    responses(
        (status = 204, description = "All sessions revoked"),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let client = client_context(&headers, peer);
    let token = bearer_token(&headers).ok_or(SessionError::InvalidAccessToken)?;

    state.session.logout(token, &client).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Get the current account
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current account", body = AccountPublic),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<AuthenticatedAccount>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.session.current_account(account.account_id).await?;
    Ok(Json(account))
}
