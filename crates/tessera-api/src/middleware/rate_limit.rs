//! Rate limiting for the authentication endpoints
//!
//! Requests are limited per client IP with a GCRA quota from the `governor`
//! crate. The client is the socket peer unless
//! `rate_limit.trust_proxy_headers` is set. The limiter is owned by
//! [`AppState`]: `main` creates it, prunes idle keys on an interval, and
//! drops it with the state. Test routers run without one.
//!
//! Author: hephaex@gmail.com

use crate::audit::client_ip;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota,
    RateLimiter as KeyedGovernor,
};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tessera_core::config::RateLimitConfig;

/// Key used when no client address can be determined
const UNKNOWN_CLIENT: &str = "unknown";

/// Decides whether a client may make another request
pub trait RateLimiter: Send + Sync {
    /// `true` if the request identified by `key` is within its quota
    fn check(&self, key: &str) -> bool;

    /// Forget keys whose quota has fully replenished
    fn prune(&self);
}

/// Per-key GCRA limiter
pub struct GovernorRateLimiter {
    limiter: KeyedGovernor<String, DefaultKeyedStateStore<String>, DefaultClock>,
}

impl GovernorRateLimiter {
    /// `None` if either rate is zero
    pub fn new(per_second: u32, burst: u32) -> Option<Self> {
        let quota = Quota::per_second(NonZeroU32::new(per_second)?)
            .allow_burst(NonZeroU32::new(burst)?);

        Some(Self {
            limiter: KeyedGovernor::keyed(quota),
        })
    }

    /// Build the configured limiter, or `None` when limiting is disabled
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        Self::new(config.per_second, config.burst)
    }

    /// Number of clients currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

impl RateLimiter for GovernorRateLimiter {
    fn check(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    fn prune(&self) {
        self.limiter.retain_recent();
    }
}

/// Quota key: the socket peer, or the forwarded client when proxy headers are trusted
fn limiter_key(request: &Request, trust_proxy_headers: bool) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let ip = if trust_proxy_headers {
        client_ip(request.headers(), peer)
    } else {
        peer.map(|addr| addr.ip().to_string())
    };
    ip.unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Reject requests over the client's quota with 429
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(request).await;
    };

    let key = limiter_key(&request, state.config.rate_limit.trust_proxy_headers);

    if !limiter.check(&key) {
        tracing::warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
        crate::metrics::record_session_operation("rate_limit", "rejected");
        return AppError::RateLimited.into_response();
    }

    next.run(request).await
}
