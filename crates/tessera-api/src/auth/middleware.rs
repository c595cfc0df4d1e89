//! Authentication middleware for protected routes
//!
//! Validates the `Authorization: Bearer <access token>` header and adds the
//! [`AuthenticatedAccount`] to request extensions.
//!
//! Author: hephaex@gmail.com

use super::jwt::AccessClaims;
use super::refresh::ClientContext;
use super::service::SessionError;
use crate::audit::{extract_ip_address, extract_user_agent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Account identity taken from a validated access token
///
/// Extract in handlers with `Extension<AuthenticatedAccount>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedAccount {
    pub account_id: Uuid,
    pub email: String,
}

impl From<AccessClaims> for AuthenticatedAccount {
    fn from(claims: AccessClaims) -> Self {
        Self {
            account_id: claims.account_id,
            email: claims.email,
        }
    }
}

/// The token of a `Bearer` authorization header, if present and non-empty
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Require a valid access token
///
/// # Usage
///
/// ```ignore
/// let protected = Router::new()
///     .route("/auth/me", get(me_handler))
///     .layer(middleware::from_fn_with_state(state, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = ClientContext::new(
        extract_ip_address(request.headers()),
        extract_user_agent(request.headers()),
    );

    let token = bearer_token(request.headers()).ok_or(SessionError::InvalidAccessToken)?;
    let claims = state.session.authenticate(token, &client)?;

    request
        .extensions_mut()
        .insert(AuthenticatedAccount::from(claims));
    Ok(next.run(request).await)
}
