//! HTTP middleware
//!
//! Author: hephaex@gmail.com

pub mod metrics;
pub mod rate_limit;
pub mod security_headers;

pub use metrics::metrics_middleware;
pub use rate_limit::{rate_limit_middleware, GovernorRateLimiter, RateLimiter};
pub use security_headers::security_headers_middleware;
