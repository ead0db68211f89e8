//! Relay service binary.
//!
//! Runs the GitHub webhook receiver on a multi-threaded runtime and the
//! Discord chat loop on a dedicated thread.
//!
//! # Environment Variables
//!
//! - `DISCORD_BOT_TOKEN`, `DISCORD_GUILD_ID`, `DISCORD_CHANNEL_ID` - Discord bot setup (required)
//! - `GITHUB_TOKEN`, `GITHUB_REPO`, `GITHUB_WEBHOOK_SECRET` - repository access (required)
//! - `WEBHOOK_PORT` - HTTP port (default 5000, falls back to `FLASK_PORT`)
//! - `LOG_DIR` - also write `relay.log` into this directory
//! - `RUST_LOG` - log filter

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use notify::DiscordClient;
use relay::gateway::{Identify, INTENTS};
use relay::{logging, server, AppState, ChatClient, Config, GitHubClient, NotificationRelay};

/// GitHub webhook receiver and Discord command bot.
#[derive(Parser)]
#[command(name = "relay-server")]
#[command(version)]
struct Cli {
    /// Port for the webhook server (overrides `WEBHOOK_PORT`)
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON
    #[arg(long, env = "RELAY_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = Config::from_env();
    let log_dir = config.as_ref().ok().and_then(|c| c.log_dir.clone());
    let _guard = logging::init(cli.json_logs, log_dir.as_deref())
        .context("Failed to initialize logging")?;

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration validation failed. Exiting.");
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(repository = %config.github_repo, "Starting GitHub Discord relay");

    let relay = NotificationRelay::new();

    let discord = DiscordClient::with_base_url(&config.discord_token, &config.discord_api_url)
        .context("Failed to create Discord client")?;
    let github = GitHubClient::with_base_url(
        &config.github_token,
        config.github_repo.clone(),
        &config.github_api_url,
    )
    .context("Failed to create GitHub client")?;

    let chat = ChatClient {
        discord,
        github: Arc::new(github),
        relay: relay.clone(),
        gateway_url: config.gateway_url.clone(),
        identify: Identify {
            token: config.discord_token.clone(),
            intents: INTENTS,
            activity: config.github_repo.to_string(),
        },
        guild_id: config.discord_guild_id,
        channel_id: config.discord_channel_id,
    };
    let _chat_thread = chat.spawn().context("Failed to start chat thread")?;
    info!("Discord chat loop started");

    let state = AppState {
        webhook_secret: config.webhook_secret.clone(),
        relay,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    server::serve(listener, state, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
