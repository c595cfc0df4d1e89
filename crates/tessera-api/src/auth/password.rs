//! Credential verification with Argon2id
//!
//! Passwords are stored as PHC strings, so the salt and cost parameters
//! travel with the hash and older hashes keep verifying after the configured
//! costs change.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::sync::Arc;
use tessera_core::config::PasswordConfig;
use thiserror::Error;

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Invalid Argon2 parameters: {0}")]
    InvalidParams(String),

    #[error("Failed to hash password: {0}")]
    HashingFailed(String),
}

/// Hashes new passwords and checks candidates against stored hashes
///
/// Neither operation logs or returns the candidate password or the hash
/// it is compared with.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    params: Params,
    /// Hash of a throwaway password under the configured costs
    decoy_hash: Arc<str>,
}

const DECOY_PASSWORD: &str = "tessera-decoy-credential";

fn argon2(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(params: &Params, password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2(params)
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

impl CredentialVerifier {
    /// Build a verifier from configured Argon2 costs
    pub fn new(config: &PasswordConfig) -> Result<Self, PasswordError> {
        let params = Params::new(
            config.memory_cost,
            config.time_cost,
            config.parallelism,
            Some(Params::DEFAULT_OUTPUT_LEN),
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        let decoy_hash = hash_with(&params, DECOY_PASSWORD)?.into();

        Ok(Self { params, decoy_hash })
    }

    /// Hash a plaintext password into a PHC string
    ///
    /// # Arguments
    ///
    /// * `password` - The plaintext password to hash
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - `$argon2id$v=19$m=...,t=...,p=...$salt$hash`
    /// * `Err(PasswordError)` - If the salt or the hash cannot be produced
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        hash_with(&self.params, password)
    }

    /// Check a candidate password against a stored PHC hash
    ///
    /// A malformed stored hash counts as a mismatch.
    pub fn verify(&self, stored_hash: &str, candidate: &str) -> bool {
        let parsed = match PasswordHash::new(stored_hash) {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("Stored password hash is not a valid PHC string");
                return false;
            }
        };

        // Parameters are read from the PHC string itself
        argon2(&self.params)
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spend one full verification on a candidate that has no stored hash
    ///
    /// Keeps a lookup miss as slow as a wrong password.
    pub fn verify_decoy(&self, candidate: &str) {
        let _ = self.verify(&self.decoy_hash, candidate);
    }
}
