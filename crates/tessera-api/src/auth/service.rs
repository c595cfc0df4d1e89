//! Session orchestrator
//!
//! Implements register, login, refresh and logout on top of the credential
//! verifier, the access token codec and the refresh token manager.
//!
//! Refresh tokens move only forward: active, then rotated, expired or
//! revoked. Presenting a token that is no longer active is treated as theft
//! and revokes every refresh token of the account.

use super::jwt::{AccessClaims, AccessTokenCodec, JwtError};
use super::password::{CredentialVerifier, PasswordError};
use super::refresh::{ClientContext, RefreshTokenError, RefreshTokenManager, Rotation};
use crate::audit::{audit_log, AuditEvent};
use crate::metrics;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_core::config::AppConfig;
use tessera_core::events::{Event, EventError, EventPublisher};
use tessera_core::models::{Account, AccountPublic, RefreshToken};
use tessera_core::store::{AccountStore, RefreshTokenStore, StoreError};
use tessera_core::validation::{
    is_valid_email, normalize_email, validate_password_strength, PasswordPolicy,
};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Account registration request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token pair returned by register, login and refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub account: AccountPublic,
}

/// Failure wiring a [`SessionService`] from configuration
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    AccessToken(#[from] JwtError),

    #[error(transparent)]
    RefreshToken(#[from] RefreshTokenError),
}

/// Broad class of a [`SessionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Conflict,
    Auth,
    Infrastructure,
}

/// Session operation errors
///
/// Auth failures carry no detail about which check failed.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password does not meet requirements: {0}")]
    WeakPassword(PasswordPolicy),

    #[error("Account already exists")]
    AccountExists,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::InvalidEmail | SessionError::WeakPassword(_) => ErrorCategory::Validation,
            SessionError::AccountExists => ErrorCategory::Conflict,
            SessionError::InvalidCredentials
            | SessionError::InvalidRefreshToken
            | SessionError::InvalidAccessToken => ErrorCategory::Auth,
            SessionError::Infrastructure(_) => ErrorCategory::Infrastructure,
        }
    }

    fn outcome(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Validation => "invalid",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Auth => "rejected",
            ErrorCategory::Infrastructure => "error",
        }
    }
}

fn infra(context: &str, e: impl std::fmt::Display) -> SessionError {
    SessionError::Infrastructure(format!("{context}: {e}"))
}

fn record<T>(operation: &str, result: &Result<T, SessionError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.outcome(),
    };
    metrics::record_session_operation(operation, outcome);
}

/// Session orchestrator
#[derive(Clone)]
pub struct SessionService {
    accounts: Arc<dyn AccountStore>,
    refresh_tokens: RefreshTokenManager,
    verifier: CredentialVerifier,
    codec: AccessTokenCodec,
    events: Arc<dyn EventPublisher>,
    event_source: String,
}

impl SessionService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        refresh_tokens: RefreshTokenManager,
        verifier: CredentialVerifier,
        codec: AccessTokenCodec,
        events: Arc<dyn EventPublisher>,
        event_source: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            refresh_tokens,
            verifier,
            codec,
            events,
            event_source: event_source.into(),
        }
    }

    /// Wire a service from configuration and the two stores
    pub fn from_config(
        config: &AppConfig,
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self, SetupError> {
        Ok(Self::new(
            accounts,
            RefreshTokenManager::new(tokens, config.tokens.refresh_token_ttl_secs)?,
            CredentialVerifier::new(&config.password)?,
            AccessTokenCodec::from_config(&config.tokens)?,
            events,
            config.events.source.clone(),
        ))
    }

    pub fn codec(&self) -> &AccessTokenCodec {
        &self.codec
    }

    /// Register a new account and open its first session
    ///
    /// # Returns
    ///
    /// * `Ok(AuthResponse)` - Token pair and the new account
    /// * `Err(InvalidEmail | WeakPassword)` - Rejected before any store access
    /// * `Err(AccountExists)` - Email already registered; nothing is written
    /// * `Err(Infrastructure)` - Store, hashing or signing failure
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        client: &ClientContext,
    ) -> Result<AuthResponse, SessionError> {
        let result = self.register_inner(email, password, client).await;
        record("register", &result);

        match &result {
            Ok(response) => audit_log(&AuditEvent::RegistrationSuccess {
                account_id: response.account.id,
                email: response.account.email.clone(),
                ip_address: client.ip.clone(),
                user_agent: client.user_agent.clone(),
            }),
            Err(e) => audit_log(&AuditEvent::RegistrationFailure {
                email: normalize_email(email),
                reason: e.to_string(),
                ip_address: client.ip.clone(),
                user_agent: client.user_agent.clone(),
            }),
        }
        result
    }

    async fn register_inner(
        &self,
        email: &str,
        password: &str,
        client: &ClientContext,
    ) -> Result<AuthResponse, SessionError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(SessionError::InvalidEmail);
        }
        validate_password_strength(password).map_err(SessionError::WeakPassword)?;

        match self.accounts.get_account_by_email(&email).await {
            Ok(_) => return Err(SessionError::AccountExists),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(infra("Failed to check existing account", e)),
        }

        let password_hash = self.hash_password(password).await?;
        let account = Account::new(&email, password_hash);

        // A concurrent registration can still win between the check and here
        self.accounts
            .create_account(&account)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => SessionError::AccountExists,
                other => infra("Failed to create account", other),
            })?;

        let response = self.issue_session(&account, client).await?;

        tracing::info!(account_id = %account.id, "Account registered");
        self.publish(Event::account_registered(
            &self.event_source,
            account.id,
            &account.email,
        ))
        .await;

        Ok(response)
    }

    /// Authenticate with email and password
    ///
    /// Unknown email and wrong password both return `InvalidCredentials`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientContext,
    ) -> Result<AuthResponse, SessionError> {
        let result = self.login_inner(email, password, client).await;
        record("login", &result);

        match &result {
            Ok(response) => audit_log(&AuditEvent::LoginSuccess {
                account_id: response.account.id,
                email: response.account.email.clone(),
                ip_address: client.ip.clone(),
                user_agent: client.user_agent.clone(),
            }),
            Err(e) => audit_log(&AuditEvent::LoginFailure {
                email: normalize_email(email),
                reason: e.to_string(),
                ip_address: client.ip.clone(),
                user_agent: client.user_agent.clone(),
            }),
        }
        result
    }

    async fn login_inner(
        &self,
        email: &str,
        password: &str,
        client: &ClientContext,
    ) -> Result<AuthResponse, SessionError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(SessionError::InvalidEmail);
        }

        let account = match self.accounts.get_account_by_email(&email).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => {
                tracing::debug!("Login for unknown email");
                self.verify_decoy(password).await?;
                return Err(SessionError::InvalidCredentials);
            }
            Err(e) => return Err(infra("Failed to load account", e)),
        };

        if !self.verify_password(&account.password_hash, password).await? {
            tracing::debug!(account_id = %account.id, "Login with wrong password");
            return Err(SessionError::InvalidCredentials);
        }

        let response = self.issue_session(&account, client).await?;

        self.publish(Event::account_logged_in(
            &self.event_source,
            account.id,
            &account.email,
            Utc::now(),
        ))
        .await;

        Ok(response)
    }

    /// Exchange a refresh token for a new token pair
    ///
    /// The presented token is single-use. Presenting it again, or losing a
    /// concurrent redemption race, revokes every refresh token of the
    /// account. If the old token cannot be revoked, nothing is issued.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientContext,
    ) -> Result<AuthResponse, SessionError> {
        let result = self.refresh_inner(refresh_token, client).await;
        record("refresh", &result);

        if let Ok(response) = &result {
            audit_log(&AuditEvent::TokenRefresh {
                account_id: response.account.id,
                ip_address: client.ip.clone(),
                user_agent: client.user_agent.clone(),
            });
        }
        result
    }

    async fn refresh_inner(
        &self,
        refresh_token: &str,
        client: &ClientContext,
    ) -> Result<AuthResponse, SessionError> {
        let record = match self.refresh_tokens.lookup(refresh_token).await {
            Ok(record) => record,
            Err(RefreshTokenError::NotFound) => return Err(SessionError::InvalidRefreshToken),
            Err(e) => return Err(infra("Failed to look up refresh token", e)),
        };

        if record.is_expired_at(Utc::now()) {
            tracing::debug!(token_id = %record.id, "Expired refresh token presented");
            return Err(SessionError::InvalidRefreshToken);
        }

        if record.is_revoked() {
            self.handle_reuse(&record, client).await;
            return Err(SessionError::InvalidRefreshToken);
        }

        let account = match self.accounts.get_account_by_id(record.account_id).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => {
                tracing::warn!(
                    account_id = %record.account_id,
                    "Refresh token belongs to a missing account"
                );
                return Err(SessionError::InvalidRefreshToken);
            }
            Err(e) => return Err(infra("Failed to load account", e)),
        };

        // Sign before rotating so a signing failure leaves the old token active
        let access_token = self
            .codec
            .issue(&account)
            .map_err(|e| infra("Failed to sign access token", e))?;

        let refresh_token = match self.refresh_tokens.rotate(&record, client).await {
            Ok(Rotation::Rotated(secret)) => secret,
            Ok(Rotation::LostRace) => {
                self.handle_reuse(&record, client).await;
                return Err(SessionError::InvalidRefreshToken);
            }
            Err(e) => {
                tracing::error!(token_id = %record.id, error = %e, "Refresh token rotation failed");
                return Err(infra("Failed to rotate refresh token", e));
            }
        };

        Ok(self.response(access_token, refresh_token, &account))
    }

    /// Revoke every refresh token of the account named by an access token
    ///
    /// Idempotent: an account without active tokens is a successful no-op.
    pub async fn logout(
        &self,
        access_token: &str,
        client: &ClientContext,
    ) -> Result<(), SessionError> {
        let result = self.logout_inner(access_token, client).await;
        record("logout", &result);
        result
    }

    async fn logout_inner(
        &self,
        access_token: &str,
        client: &ClientContext,
    ) -> Result<(), SessionError> {
        let claims = self.authenticate(access_token, client)?;

        let revoked = self
            .refresh_tokens
            .revoke_all_for_account(claims.account_id)
            .await
            .map_err(|e| infra("Failed to revoke refresh tokens", e))?;

        audit_log(&AuditEvent::Logout {
            account_id: claims.account_id,
            revoked_tokens: revoked,
            ip_address: client.ip.clone(),
        });
        Ok(())
    }

    /// Validate an access token
    pub fn authenticate(
        &self,
        access_token: &str,
        client: &ClientContext,
    ) -> Result<AccessClaims, SessionError> {
        self.codec.validate(access_token).map_err(|e| {
            audit_log(&AuditEvent::InvalidToken {
                ip_address: client.ip.clone(),
                user_agent: client.user_agent.clone(),
                reason: e.to_string(),
            });
            SessionError::InvalidAccessToken
        })
    }

    /// Public view of an authenticated account
    pub async fn current_account(&self, account_id: Uuid) -> Result<AccountPublic, SessionError> {
        match self.accounts.get_account_by_id(account_id).await {
            Ok(account) => Ok(account.to_public()),
            Err(StoreError::NotFound) => Err(SessionError::InvalidAccessToken),
            Err(e) => Err(infra("Failed to load account", e)),
        }
    }

    async fn handle_reuse(&self, record: &RefreshToken, client: &ClientContext) {
        metrics::record_session_operation("refresh", "reuse_detected");

        // The caller gets InvalidRefreshToken whether or not this succeeds
        let revoked = match self
            .refresh_tokens
            .revoke_all_for_account(record.account_id)
            .await
        {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::error!(
                    account_id = %record.account_id,
                    error = %e,
                    "Failed to revoke tokens after refresh token reuse"
                );
                None
            }
        };

        tracing::warn!(
            account_id = %record.account_id,
            token_id = %record.id,
            revoked_tokens = ?revoked,
            "Refresh token reuse detected, all account sessions revoked"
        );
        audit_log(&AuditEvent::RefreshTokenReuse {
            account_id: record.account_id,
            token_id: record.id,
            revoked_tokens: revoked,
            ip_address: client.ip.clone(),
            user_agent: client.user_agent.clone(),
        });
    }

    async fn issue_session(
        &self,
        account: &Account,
        client: &ClientContext,
    ) -> Result<AuthResponse, SessionError> {
        let access_token = self
            .codec
            .issue(account)
            .map_err(|e| infra("Failed to sign access token", e))?;

        let refresh_token = self
            .refresh_tokens
            .issue_and_store(account.id, client)
            .await
            .map_err(|e| infra("Failed to store refresh token", e))?;

        Ok(self.response(access_token, refresh_token, account))
    }

    fn response(
        &self,
        access_token: String,
        refresh_token: String,
        account: &Account,
    ) -> AuthResponse {
        AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.ttl_secs(),
            account: account.to_public(),
        }
    }

    async fn hash_password(&self, password: &str) -> Result<String, SessionError> {
        let verifier = self.verifier.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || verifier.hash(&password))
            .await
            .map_err(|e| infra("Password hashing task failed", e))?
            .map_err(|e| infra("Failed to hash password", e))
    }

    async fn verify_password(
        &self,
        stored_hash: &str,
        candidate: &str,
    ) -> Result<bool, SessionError> {
        let verifier = self.verifier.clone();
        let stored_hash = stored_hash.to_string();
        let candidate = candidate.to_string();
        tokio::task::spawn_blocking(move || verifier.verify(&stored_hash, &candidate))
            .await
            .map_err(|e| infra("Password verification task failed", e))
    }

    async fn verify_decoy(&self, candidate: &str) -> Result<(), SessionError> {
        let verifier = self.verifier.clone();
        let candidate = candidate.to_string();
        tokio::task::spawn_blocking(move || verifier.verify_decoy(&candidate))
            .await
            .map_err(|e| infra("Password verification task failed", e))
    }

    /// Publish an event, logging instead of failing
    async fn publish(&self, event: Result<Event, EventError>) {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build event");
                return;
            }
        };

        if let Err(e) = self.events.publish(&event).await {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Failed to publish event"
            );
        }
    }
}
