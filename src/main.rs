mod commands;
mod config;
mod platform;
mod router;
mod sheets;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::router::Router;
use crate::sheets::auth::SessionProvider;
use crate::sheets::SheetsClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pawlog=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load_or_init(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if config.has_placeholders() {
        warn!(
            "{} still contains placeholder values, edit it and restart",
            config_path.display()
        );
        return Ok(());
    }
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("  Spreadsheet: {}", config.sheets.spreadsheet_id);
    info!("  Sheet: {}", config.sheets.sheet_id);
    info!("  Token file: {}", config.token_path().display());

    // Authorize once up front; failure here is fatal
    let sessions = Arc::new(SessionProvider::from_config(&config)?);
    sessions
        .acquire()
        .await
        .context("Google authorization failed")?;

    let sheets = Arc::new(SheetsClient::new(&config, sessions)?);
    match sheets.header_row().await {
        Ok(header) => info!("Spreadsheet reachable, header: {:?}", header),
        Err(e) => warn!("Could not read spreadsheet header: {:#}", e),
    }

    let router = Arc::new(Router::new(sheets));
    let bot = Bot::new(&config.telegram.token);

    info!("Bot is starting...");
    platform::telegram::run(router, bot).await?;

    Ok(())
}
