//! Tessera API Server
//!
//! REST API server for the Tessera session service.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tessera_api::auth::SessionService;
use tessera_api::events::publisher_from_config;
use tessera_api::middleware::{GovernorRateLimiter, RateLimiter};
use tessera_api::{create_router, metrics, state::AppState};
use tessera_core::config::{AppConfig, LogFormat, StoreBackend};
use tessera_core::store::{AccountStore, RefreshTokenStore};
use tessera_store::{
    InMemoryAccountStore, InMemoryRefreshTokenStore, PgAccountStore, PgRefreshTokenStore,
};
use tracing_subscriber::EnvFilter;

/// Idle rate limiter keys are pruned this often
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "tessera-api", version, about = "Tessera session service")]
struct Args {
    /// TOML configuration file; environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tessera_api={level},tessera_store={level},audit=info,events=info,tower_http=info",
            level = config.logging.level
        ))
    });

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

async fn open_stores(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn AccountStore>, Arc<dyn RefreshTokenStore>)> {
    match config.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; all sessions are lost on restart");
            Ok((
                Arc::new(InMemoryAccountStore::new()),
                Arc::new(InMemoryRefreshTokenStore::new()),
            ))
        }
        StoreBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .context("database.url is required for the postgres backend")?;
            let pool = tessera_store::connect(url, config.database.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            tessera_store::ensure_schema(&pool)
                .await
                .context("Failed to apply schema")?;
            tracing::info!("Connected to PostgreSQL");

            Ok((
                Arc::new(PgAccountStore::new(pool.clone())),
                Arc::new(PgRefreshTokenStore::new(pool)),
            ))
        }
    }
}

async fn shutdown_signal(state: Arc<AppState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown...")
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received SIGINT, initiating graceful shutdown...")
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received SIGINT, initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
    }

    state.set_ready(false);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    init_tracing(&config);
    metrics::init();

    let (accounts, tokens) = open_stores(&config).await?;
    let events = publisher_from_config(&config.events).context("Failed to configure events")?;
    let session = SessionService::from_config(&config, accounts, tokens, events)
        .context("Failed to configure session service")?;

    let rate_limiter: Option<Arc<dyn RateLimiter>> =
        match GovernorRateLimiter::from_config(&config.rate_limit) {
            Some(limiter) => {
                let limiter: Arc<dyn RateLimiter> = Arc::new(limiter);
                let pruned = limiter.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
                    loop {
                        interval.tick().await;
                        pruned.prune();
                    }
                });
                Some(limiter)
            }
            None => {
                tracing::warn!("Rate limiting disabled");
                None
            }
        };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(Arc::new(config), session, rate_limiter));
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Tessera API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state))
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
