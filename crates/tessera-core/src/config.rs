//! Tessera Configuration Management
//!
//! Configuration comes from a TOML file, `TESSERA_*` environment variables,
//! or both. It is loaded once at startup and shared read-only afterwards.
//!
//! Author: hephaex@gmail.com

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Shortest accepted HMAC signing secret, in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest accepted access or refresh token lifetime, in seconds
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Store backend selection
    pub database: DatabaseConfig,

    /// Access and refresh token settings
    pub tokens: TokenConfig,

    /// Argon2 cost parameters
    pub password: PasswordConfig,

    /// Lifecycle event sink
    pub events: EventsConfig,

    /// Per-client request limiting
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("TESSERA_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("TESSERA_PORT") {
            config.server.port = parse_env("TESSERA_PORT", port)?;
        }
        if let Ok(origins) = std::env::var("TESSERA_CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Store
        if let Ok(backend) = std::env::var("TESSERA_STORE_BACKEND") {
            config.database.backend = backend.parse()?;
        }
        if let Ok(url) = std::env::var("TESSERA_DATABASE_URL") {
            config.database.url = Some(url);
        }

        // Tokens
        if let Ok(secret) = std::env::var("TESSERA_JWT_SECRET") {
            config.tokens.jwt_secret = secret;
        }
        if let Ok(ttl) = std::env::var("TESSERA_ACCESS_TOKEN_TTL_SECS") {
            config.tokens.access_token_ttl_secs = parse_env("TESSERA_ACCESS_TOKEN_TTL_SECS", ttl)?;
        }
        if let Ok(ttl) = std::env::var("TESSERA_REFRESH_TOKEN_TTL_SECS") {
            config.tokens.refresh_token_ttl_secs =
                parse_env("TESSERA_REFRESH_TOKEN_TTL_SECS", ttl)?;
        }

        // Events
        if let Ok(sink) = std::env::var("TESSERA_EVENT_SINK") {
            config.events.sink = sink.parse()?;
        }
        if let Ok(url) = std::env::var("TESSERA_EVENT_WEBHOOK_URL") {
            config.events.webhook_url = Some(url);
        }

        // Rate limiting
        if let Ok(rate) = std::env::var("TESSERA_RATE_LIMIT_PER_SECOND") {
            config.rate_limit.per_second = parse_env("TESSERA_RATE_LIMIT_PER_SECOND", rate)?;
        }
        if let Ok(burst) = std::env::var("TESSERA_RATE_LIMIT_BURST") {
            config.rate_limit.burst = parse_env("TESSERA_RATE_LIMIT_BURST", burst)?;
        }
        if let Ok(trust) = std::env::var("TESSERA_RATE_LIMIT_TRUST_PROXY_HEADERS") {
            config.rate_limit.trust_proxy_headers =
                parse_env("TESSERA_RATE_LIMIT_TRUST_PROXY_HEADERS", trust)?;
        }

        // Logging
        if let Ok(level) = std::env::var("TESSERA_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("TESSERA_LOG_FORMAT") {
            config.logging.format = format.parse()?;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|message| ConfigError::ParseError { path, message })
    }

    fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        if env_config.server.host != ServerConfig::default().host {
            self.server.host = env_config.server.host;
        }
        if env_config.server.port != ServerConfig::default().port {
            self.server.port = env_config.server.port;
        }
        if !env_config.server.cors_origins.is_empty() {
            self.server.cors_origins = env_config.server.cors_origins;
        }

        // Secrets and connection strings always come from env when present
        if !env_config.tokens.jwt_secret.is_empty() {
            self.tokens.jwt_secret = env_config.tokens.jwt_secret;
        }
        if env_config.database.url.is_some() {
            self.database.url = env_config.database.url;
        }
        if env_config.events.webhook_url.is_some() {
            self.events.webhook_url = env_config.events.webhook_url;
        }

        if env_config.logging.level != LoggingConfig::default().level {
            self.logging.level = env_config.logging.level;
        }

        Ok(self)
    }

    /// Reject configurations the service cannot run safely with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.jwt_secret.is_empty() {
            return Err(ConfigError::MissingRequired("tokens.jwt_secret".to_string()));
        }
        if self.tokens.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::InvalidValue {
                key: "tokens.jwt_secret".to_string(),
                value: format!(
                    "<{} bytes, need {MIN_JWT_SECRET_LEN}>",
                    self.tokens.jwt_secret.len()
                ),
            });
        }
        for (key, ttl) in [
            ("tokens.access_token_ttl_secs", self.tokens.access_token_ttl_secs),
            ("tokens.refresh_token_ttl_secs", self.tokens.refresh_token_ttl_secs),
        ] {
            if ttl == 0 || ttl > MAX_TOKEN_TTL_SECS {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: ttl.to_string(),
                });
            }
        }
        if self.tokens.refresh_token_ttl_secs <= self.tokens.access_token_ttl_secs {
            return Err(ConfigError::InvalidValue {
                key: "tokens.refresh_token_ttl_secs".to_string(),
                value: self.tokens.refresh_token_ttl_secs.to_string(),
            });
        }
        if self.database.backend == StoreBackend::Postgres && self.database.url.is_none() {
            return Err(ConfigError::MissingRequired("database.url".to_string()));
        }
        if self.events.sink == EventSink::Webhook && self.events.webhook_url.is_none() {
            return Err(ConfigError::MissingRequired("events.webhook_url".to_string()));
        }
        let rate_limit = &self.rate_limit;
        if rate_limit.enabled && (rate_limit.per_second == 0 || rate_limit.burst == 0) {
            return Err(ConfigError::InvalidValue {
                key: "rate_limit".to_string(),
                value: format!("{}/s burst {}", self.rate_limit.per_second, self.rate_limit.burst),
            });
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_origins: vec![],
        }
    }
}

/// Which engine backs the account and token stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::InvalidValue {
                key: "TESSERA_STORE_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,

    /// PostgreSQL connection URL
    pub url: Option<String>,

    /// PostgreSQL connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            max_connections: 10,
        }
    }
}

/// Token lifetimes and signing secret
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HS256 signing secret
    pub jwt_secret: String,

    pub access_token_ttl_secs: u64,

    pub refresh_token_ttl_secs: u64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .finish()
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,

    /// Number of iterations
    pub time_cost: u32,

    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Where lifecycle events are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSink {
    Log,
    Webhook,
    None,
}

impl std::str::FromStr for EventSink {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "webhook" => Ok(Self::Webhook),
            "none" | "off" => Ok(Self::None),
            _ => Err(ConfigError::InvalidValue {
                key: "TESSERA_EVENT_SINK".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Event emission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub sink: EventSink,

    /// Target for the webhook sink
    pub webhook_url: Option<String>,

    /// Value of the envelope `source` field
    pub source: String,

    /// Webhook request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            sink: EventSink::Log,
            webhook_url: None,
            source: "auth-service".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Per-client-IP rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Sustained requests per second
    pub per_second: u32,

    /// Bucket capacity
    pub burst: u32,

    /// Key clients by `X-Forwarded-For` / `X-Real-IP` instead of the socket
    /// peer. Enable only behind a proxy that overwrites these headers.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_second: 5,
            burst: 10,
            trust_proxy_headers: false,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                key: "TESSERA_LOG_FORMAT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
