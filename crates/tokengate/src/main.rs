//! # Tokengate - Staff Token Redemption Service
//!
//! Issues single-use staff tokens and redeems them for the configured guild
//! roles, guarded by an escalating lockout ledger and CAPTCHA gating.
//!
//! ## Architecture
//! ```text
//! Bot front-end → Tokengate (HTTP) → Discord REST
//!                     ↓
//!          tokens.json / Redis, guild.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod captcha;
mod config;
mod credentials;
mod engine;
mod guild_config;
mod ledger;
mod persist;
mod platform;
mod routes;
mod state;
mod worker;

use config::AppConfig;
use platform::DiscordGuild;
use state::AppState;
use worker::maintenance_worker;

/// Tokengate - staff token redemption service
#[derive(Parser, Debug)]
#[command(name = "tokengate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/tokengate.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Directory holding tokens.json and guild.json (overrides config)
    #[arg(long, env = "TOKENGATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Guild served by this instance (overrides config)
    #[arg(long, env = "GUILD_ID")]
    guild_id: Option<u64>,

    /// Bot token for the platform REST API
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    discord_token: Option<String>,

    /// Shared secret expected from the bot front-end
    #[arg(long, env = "TOKENGATE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("🔑 Starting Tokengate v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!("📋 Configuration loaded from {}", args.config);

    let discord_token = config
        .discord_token
        .as_deref()
        .context("DISCORD_TOKEN is required")?;
    let guild = Arc::new(
        DiscordGuild::new(discord_token, config.guild_id).context("Failed to create Discord client")?,
    );

    let state = AppState::new(&config, guild).await?;

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let engine = state.engine.clone();
    let worker_shutdown = shutdown_tx.subscribe();
    let interval = config.maintenance_interval_secs;
    tokio::spawn(async move {
        maintenance_worker(engine, interval, worker_shutdown).await;
    });

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Tokengate listening on {}", config.listen_addr);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Tokengate shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
