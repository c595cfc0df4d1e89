//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::SessionService;
use crate::middleware::rate_limit::RateLimiter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tessera_core::config::AppConfig;

/// Application state shared across handlers
pub struct AppState {
    /// Read-only after startup
    pub config: Arc<AppConfig>,
    /// Session orchestrator
    pub session: SessionService,
    /// Per-client limiter for the auth endpoints; `None` disables limiting
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
    /// Server start time
    pub start_time: Instant,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        session: SessionService,
        rate_limiter: Option<Arc<dyn RateLimiter>>,
    ) -> Self {
        Self {
            config,
            session,
            rate_limiter,
            start_time: Instant::now(),
            is_ready: AtomicBool::new(true),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
