//! Access token codec
//!
//! Issues and validates HS256-signed access tokens. Validation is a pure
//! function of the token and the signing secret: no store lookup and no
//! revocation list. A token that declares any algorithm other than HS256
//! is rejected before its signature is checked.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tessera_core::config::{TokenConfig, MAX_TOKEN_TTL_SECS};
use tessera_core::models::Account;
use thiserror::Error;
use uuid::Uuid;

/// Access token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub account_id: Uuid,
    pub email: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Not before (Unix seconds)
    pub nbf: i64,
    /// Expires at (Unix seconds)
    pub exp: i64,
    /// Subject, the account ID as a string
    pub sub: String,
}

/// Access token errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not valid yet")]
    NotYetValid,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token algorithm does not match HS256")]
    AlgorithmMismatch,

    #[error("Access token lifetime out of range: {0}s")]
    InvalidTtl(u64),
}

/// Signs and verifies access tokens with a shared secret
#[derive(Clone)]
pub struct AccessTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
    lifetime: i64,
}

impl AccessTokenCodec {
    pub const ALGORITHM: Algorithm = Algorithm::HS256;

    /// Build a codec; `ttl_secs` must be between 1 and [`MAX_TOKEN_TTL_SECS`]
    pub fn new(secret: &[u8], ttl_secs: u64) -> Result<Self, JwtError> {
        let lifetime = i64::try_from(ttl_secs)
            .ok()
            .filter(|_| (1..=MAX_TOKEN_TTL_SECS).contains(&ttl_secs))
            .ok_or(JwtError::InvalidTtl(ttl_secs))?;

        let mut validation = Validation::new(Self::ALGORITHM);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl_secs,
            lifetime,
        })
    }

    pub fn from_config(config: &TokenConfig) -> Result<Self, JwtError> {
        Self::new(config.jwt_secret.as_bytes(), config.access_token_ttl_secs)
    }

    /// Access token lifetime in seconds
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issue a signed access token for an account
    ///
    /// # Arguments
    ///
    /// * `account` - The authenticated account
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Compact JWS, valid from now until now + TTL
    /// * `Err(JwtError::Encoding)` - If signing fails
    pub fn issue(&self, account: &Account) -> Result<String, JwtError> {
        self.issue_for(account.id, &account.email)
    }

    pub fn issue_for(&self, account_id: Uuid, email: &str) -> Result<String, JwtError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            account_id,
            email: email.to_string(),
            iat: now,
            nbf: now,
            exp: now + self.lifetime,
            sub: account_id.to_string(),
        };

        Ok(encode(
            &Header::new(Self::ALGORITHM),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Validate a token and return its claims
    ///
    /// Rejects a foreign algorithm, a bad signature, an expired token, a
    /// token used before its `nbf`, and a `sub` that disagrees with
    /// `account_id`.
    pub fn validate(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidAlgorithm => JwtError::AlgorithmMismatch,
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::ExpiredSignature => JwtError::Expired,
                ErrorKind::ImmatureSignature => JwtError::NotYetValid,
                _ => JwtError::InvalidToken,
            },
        )?;

        if data.claims.sub != data.claims.account_id.to_string() {
            return Err(JwtError::InvalidToken);
        }

        Ok(data.claims)
    }
}
