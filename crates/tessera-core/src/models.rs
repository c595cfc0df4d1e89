//! Session domain models
//!
//! - [`Account`]: a registered identity with its password hash
//! - [`RefreshToken`]: the persisted record of one issued refresh secret
//!
//! The refresh-token record shape is the storage contract shared by every
//! [`crate::store::RefreshTokenStore`] backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::validation::normalize_email;

/// Account model
///
/// The password hash is never serialized; use [`Account::to_public`] for
/// anything that leaves the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque, immutable account identifier
    pub id: Uuid,

    /// Normalized (trimmed, lowercase) email, unique per store
    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Whether the email address has been verified
    #[serde(default)]
    pub is_verified: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new, unverified account
    ///
    /// The email is normalized here so every store sees the same key.
    pub fn new(email: &str, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash,
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Public representation (no credential material)
    pub fn to_public(&self) -> AccountPublic {
        AccountPublic {
            id: self.id,
            email: self.email.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_verified: self.is_verified,
        }
    }
}

/// Account as returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccountPublic {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_verified: bool,
}

/// Lifecycle state of a refresh token at a given instant
///
/// Rotation is recorded as a revocation, so a rotated token reports
/// `Revoked`. No state ever leads back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Active,
    Expired,
    Revoked,
}

/// Refresh token record
///
/// Only the SHA-256 digest of the secret is stored; the plaintext exists
/// once, in the response that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,

    /// Owning account
    pub account_id: Uuid,

    /// Hex-encoded digest of the secret, used as the lookup key
    pub token_hash: String,

    /// Absolute expiry, fixed at issuance
    pub expires_at: DateTime<Utc>,

    /// Set once, never cleared
    pub revoked_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Client network address at issuance
    pub client_ip: Option<String>,

    /// Client user agent at issuance
    pub user_agent: Option<String>,
}

impl RefreshToken {
    /// Build a new active record expiring `ttl` from now
    ///
    /// Empty client context strings are stored as `None`.
    pub fn new(
        account_id: Uuid,
        token_hash: String,
        ttl: chrono::Duration,
        client_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            token_hash,
            expires_at: now + ttl,
            revoked_at: None,
            created_at: now,
            updated_at: now,
            client_ip: client_ip.filter(|s| !s.is_empty()),
            user_agent: user_agent.filter(|s| !s.is_empty()),
        }
    }

    /// True iff `now` is at or after `expires_at`, regardless of revocation
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Active iff not revoked and not yet expired
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }

    /// Lifecycle state, revocation taking precedence over expiry
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if self.is_revoked() {
            TokenState::Revoked
        } else if self.is_expired_at(now) {
            TokenState::Expired
        } else {
            TokenState::Active
        }
    }
}
