//! Security audit logging for session events
//!
//! Every registration, login, refresh, logout and rejected access token is
//! recorded under the `audit` tracing target so it can be routed apart from
//! application logs. Refresh-token reuse is logged at WARN; everything else
//! at INFO.
//!
//! Audit records never carry passwords, password hashes or token secrets.
//!
//! # Example
//!
//! ```ignore
//! use tessera_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     account_id: account.id,
//!     email: account.email.clone(),
//!     ip_address: Some("192.168.1.1".to_string()),
//!     user_agent: Some("Mozilla/5.0...".to_string()),
//! });
//! ```
//!
//! Author: hephaex@gmail.com

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{info, warn};
use uuid::Uuid;

/// Security audit events for the session lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Account created
    RegistrationSuccess {
        account_id: Uuid,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Registration rejected
    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Credentials accepted
    LoginSuccess {
        account_id: Uuid,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Credentials rejected
    LoginFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Refresh token rotated
    TokenRefresh {
        account_id: Uuid,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// A revoked refresh token was presented again
    RefreshTokenReuse {
        account_id: Uuid,
        token_id: Uuid,
        /// Tokens revoked in response; `None` if the cleanup itself failed
        revoked_tokens: Option<u64>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// All refresh tokens of an account revoked on request
    Logout {
        account_id: Uuid,
        revoked_tokens: u64,
        ip_address: Option<String>,
    },

    /// Invalid or expired access token presented
    InvalidToken {
        ip_address: Option<String>,
        user_agent: Option<String>,
        reason: String,
    },
}

/// Log a security audit event with structured fields
///
/// The full event is also attached as JSON in the `event` field for log
/// aggregators.
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::RegistrationSuccess {
            account_id,
            email,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                account_id = %account_id,
                email = %email,
                ip_address = ?ip_address,
                "Registration successful"
            );
        }
        AuditEvent::RegistrationFailure {
            email,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                reason = %reason,
                ip_address = ?ip_address,
                "Registration failed"
            );
        }
        AuditEvent::LoginSuccess {
            account_id,
            email,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                account_id = %account_id,
                email = %email,
                ip_address = ?ip_address,
                "Login successful"
            );
        }
        AuditEvent::LoginFailure {
            email,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                email = %email,
                reason = %reason,
                ip_address = ?ip_address,
                "Login failed"
            );
        }
        AuditEvent::TokenRefresh {
            account_id,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                account_id = %account_id,
                ip_address = ?ip_address,
                "Refresh token rotated"
            );
        }
        AuditEvent::RefreshTokenReuse {
            account_id,
            token_id,
            revoked_tokens,
            ip_address,
            ..
        } => {
            warn!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                account_id = %account_id,
                token_id = %token_id,
                revoked_tokens = ?revoked_tokens,
                ip_address = ?ip_address,
                "Refresh token reuse detected"
            );
        }
        AuditEvent::Logout {
            account_id,
            revoked_tokens,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                account_id = %account_id,
                revoked_tokens = %revoked_tokens,
                ip_address = ?ip_address,
                "Logout"
            );
        }
        AuditEvent::InvalidToken {
            ip_address,
            reason,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                reason = %reason,
                ip_address = ?ip_address,
                "Invalid access token"
            );
        }
    }
}

/// Extract the client IP from proxy headers
///
/// Checks the first hop of `X-Forwarded-For`, then `X-Real-IP`. Empty
/// values are treated as absent.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    // Proxy / load balancer chain
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    // nginx
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            let ip_str = ip_str.trim();
            if !ip_str.is_empty() {
                return Some(ip_str.to_string());
            }
        }
    }

    None
}

/// Client IP from headers, falling back to the socket peer address
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    extract_ip_address(headers).or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Extract the user agent from request headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::LoginSuccess {
            account_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"login_success\""));
        assert!(json.contains("test@example.com"));
    }

    #[test]
    fn test_reuse_event_serialization() {
        let event = AuditEvent::RefreshTokenReuse {
            account_id: Uuid::new_v4(),
            token_id: Uuid::new_v4(),
            revoked_tokens: None,
            ip_address: None,
            user_agent: None,
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "refresh_token_reuse");
        assert!(json["revoked_tokens"].is_null());

        // Must not panic
        audit_log(&event);
    }

    #[test]
    fn test_audit_log_all_outcomes() {
        let account_id = Uuid::new_v4();

        audit_log(&AuditEvent::RegistrationFailure {
            email: "invalid@example.com".to_string(),
            reason: "account exists".to_string(),
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("Test".to_string()),
        });
        audit_log(&AuditEvent::TokenRefresh {
            account_id,
            ip_address: None,
            user_agent: None,
        });
        audit_log(&AuditEvent::Logout {
            account_id,
            revoked_tokens: 2,
            ip_address: None,
        });
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.1".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "198.51.100.7:52000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer)), Some("198.51.100.7".to_string()));
        assert_eq!(client_ip(&headers, None), None);
    }

    #[test]
    fn test_empty_headers_are_absent() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "".parse().unwrap());
        headers.insert(axum::http::header::USER_AGENT, "".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), None);
        assert_eq!(extract_user_agent(&headers), None);
    }

    #[test]
    fn test_extract_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            "Mozilla/5.0 (Test)".parse().unwrap(),
        );

        assert_eq!(
            extract_user_agent(&headers),
            Some("Mozilla/5.0 (Test)".to_string())
        );
    }
}
