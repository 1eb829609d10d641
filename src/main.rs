//! trenerbot - Telegram workout planner

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trenerbot::session::InMemorySessionStore;
use trenerbot::{Config, Conversation};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    config.validate()?;

    let store = Arc::new(InMemorySessionStore::new(config.history_limit, config.session_ttl()));
    let generator = config.generation_client()?;

    info!(
        provider = ?config.provider,
        model = config.model(),
        history_limit = config.history_limit,
        session_ttl_hours = config.session_ttl_hours,
        "Starting Telegram bot..."
    );

    trenerbot::bot::run_bot(config.telegram_token, Conversation::new(store, generator)).await
}
