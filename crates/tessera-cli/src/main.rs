//! Tessera CLI - operator commands for the session store
//!
//! Usage:
//!   tessera migrate
//!   tessera purge-expired [--older-than-hours N]
//!   tessera revoke-account <ACCOUNT_ID>
//!   tessera check-config
//!
//! Every command accepts `--config <FILE>`; without it configuration comes
//! from `TESSERA_*` environment variables.

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tessera_core::config::{AppConfig, StoreBackend};
use tessera_core::store::RefreshTokenStore;
use tessera_store::PgRefreshTokenStore;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera session service operator CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the accounts and refresh_tokens tables if missing
    Migrate,
    /// Delete refresh tokens that expired before the cutoff
    PurgeExpired {
        /// Keep tokens that expired within this many hours
        #[arg(long, default_value_t = 0)]
        older_than_hours: u32,
    },
    /// Revoke every active refresh token of an account
    RevokeAccount {
        /// Account ID
        account_id: Uuid,
    },
    /// Validate configuration and print a summary
    CheckConfig,
}

/// Load configuration without validating it
///
/// Maintenance commands only need the database section; `check-config`
/// runs the full validation.
fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

/// Expiry cutoff for `purge-expired`
fn purge_cutoff(now: DateTime<Utc>, older_than_hours: u32) -> DateTime<Utc> {
    now - Duration::hours(i64::from(older_than_hours))
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    if config.database.backend != StoreBackend::Postgres {
        bail!(
            "this command needs the postgres store backend; \
             the memory backend has nothing to maintain"
        );
    }
    let url = config
        .database
        .url
        .as_deref()
        .context("database.url is required for the postgres backend")?;

    tessera_store::connect(url, config.database.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")
}

fn print_summary(config: &AppConfig) {
    println!("Configuration OK");
    println!("  listen:          {}:{}", config.server.host, config.server.port);
    println!("  store backend:   {:?}", config.database.backend);
    println!("  access TTL:      {}s", config.tokens.access_token_ttl_secs);
    println!("  refresh TTL:     {}s", config.tokens.refresh_token_ttl_secs);
    println!(
        "  argon2:          m={} t={} p={}",
        config.password.memory_cost, config.password.time_cost, config.password.parallelism
    );
    println!("  event sink:      {:?}", config.events.sink);
    if config.rate_limit.enabled {
        println!(
            "  rate limit:      {}/s burst {}",
            config.rate_limit.per_second, config.rate_limit.burst
        );
    } else {
        println!("  rate limit:      disabled");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera_store=info,warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Migrate => {
            let pool = connect(&config).await?;
            tessera_store::ensure_schema(&pool)
                .await
                .context("Failed to apply schema")?;
            println!("Schema is up to date");
        }
        Commands::PurgeExpired { older_than_hours } => {
            let pool = connect(&config).await?;
            let store = PgRefreshTokenStore::new(pool);
            let cutoff = purge_cutoff(Utc::now(), older_than_hours);

            let deleted = store
                .delete_expired_tokens(cutoff)
                .await
                .context("Failed to purge expired tokens")?;
            println!("Deleted {deleted} refresh tokens that expired before {cutoff}");
        }
        Commands::RevokeAccount { account_id } => {
            let pool = connect(&config).await?;
            let store = PgRefreshTokenStore::new(pool);

            let revoked = store
                .revoke_tokens_for_account(account_id)
                .await
                .context("Failed to revoke tokens")?;
            tracing::warn!(
                account_id = %account_id,
                revoked,
                "Account sessions revoked by operator"
            );
            println!("Revoked {revoked} refresh tokens for account {account_id}");
        }
        Commands::CheckConfig => {
            config.validate()?;
            print_summary(&config);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_cutoff() {
        let now = Utc::now();
        assert_eq!(purge_cutoff(now, 0), now);
        assert_eq!(purge_cutoff(now, 24), now - Duration::days(1));
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["tessera", "purge-expired", "--older-than-hours", "12"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::PurgeExpired {
                older_than_hours: 12
            }
        ));

        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let cli = Cli::try_parse_from([
            "tessera",
            "revoke-account",
            id_arg.as_str(),
            "--config",
            "tessera.toml",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::RevokeAccount { account_id } if account_id == id));
        assert_eq!(cli.config, Some(PathBuf::from("tessera.toml")));
    }

    #[test]
    fn test_rejects_malformed_account_id() {
        assert!(Cli::try_parse_from(["tessera", "revoke-account", "not-a-uuid"]).is_err());
    }

    #[tokio::test]
    async fn test_memory_backend_has_nothing_to_maintain() {
        let config = AppConfig::default();
        assert!(connect(&config).await.is_err());
    }
}
