//! Input validation for account credentials
//!
//! Both checks run before any store access so malformed input never costs
//! a database round trip.

use std::fmt;
use validator::ValidateEmail;

/// Minimum password length in characters
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum password length in characters
pub const MAX_PASSWORD_LEN: usize = 64;

/// Reason a password was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPolicy {
    TooShort,
    TooLong,
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSpecial,
}

impl fmt::Display for PasswordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PasswordPolicy::TooShort => "password must be at least 8 characters long",
            PasswordPolicy::TooLong => "password must be at most 64 characters long",
            PasswordPolicy::MissingUppercase => "password must contain an uppercase letter",
            PasswordPolicy::MissingLowercase => "password must contain a lowercase letter",
            PasswordPolicy::MissingDigit => "password must contain a digit",
            PasswordPolicy::MissingSpecial => "password must contain a special character",
        };
        f.write_str(msg)
    }
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check the format of an already-normalized email address
///
/// Beyond RFC syntax the domain must carry an alphabetic top-level label of
/// at least two characters, so `user@localhost` is rejected.
pub fn is_valid_email(email: &str) -> bool {
    if !email.validate_email() {
        return false;
    }

    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };

    match domain.rsplit_once('.') {
        Some((host, tld)) => {
            !host.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

/// Validate password strength
///
/// Requires 8 to 64 characters with at least one uppercase letter, one
/// lowercase letter, one digit and one character that is neither a letter
/// nor a digit.
pub fn validate_password_strength(password: &str) -> Result<(), PasswordPolicy> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(PasswordPolicy::TooShort);
    }
    if len > MAX_PASSWORD_LEN {
        return Err(PasswordPolicy::TooLong);
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(PasswordPolicy::MissingUppercase);
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(PasswordPolicy::MissingLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordPolicy::MissingDigit);
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(PasswordPolicy::MissingSpecial);
    }

    Ok(())
}
