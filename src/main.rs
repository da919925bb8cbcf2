//! Showoff bot - collection reports for Telegram.
//!
//! Staff browse collections from the warehouse and request statistics
//! reports scraped from the admin panel. A background scheduler watches for
//! collections entering the target status and broadcasts their reports to
//! registered group chats.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - Flat JSON files (staff, chats, status snapshot)
//! - `cache` - TTL caching with Moka
//! - `warehouse` - BigQuery collections table
//! - `collector` - Admin panel automation over WebDriver
//! - `reports` - Report formatting and broadcast
//! - `tracker` - Status change detection and the polling scheduler
//! - `permissions` - Staff authorization
//! - `bot` - Core bot functionality (with Throttle for API rate limiting)
//! - `plugins` - Command and button handlers
//! - `events` - Report chat registration
//! - `utils` - Utility functions

mod bot;
mod cache;
mod collector;
mod config;
mod database;
mod events;
mod permissions;
mod plugins;
mod reports;
mod tracker;
mod utils;
mod warehouse;

use std::sync::Arc;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bot::AppState;
use collector::{AdminPanelCollector, ReportCollector};
use config::Config;
use database::{ChatRepo, JsonSnapshotStore, UserRepo};
use plugins::Command;
use reports::ReportSender;
use tracker::{StatusScheduler, StatusTracker};
use warehouse::{BigQueryClient, CollectionSource};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("showoff_bot=info,teloxide=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting showoff bot...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    info!("Data directory: {}", config.data_dir.display());

    // Flat JSON stores
    let users = Arc::new(UserRepo::new(config.users_file()));
    let chats = Arc::new(ChatRepo::new(config.chats_file()));
    let snapshot_store = Arc::new(JsonSnapshotStore::new(config.status_file()));
    users.ensure_exists().await?;
    chats.ensure_exists().await?;
    snapshot_store.ensure_exists().await?;

    let source: Arc<dyn CollectionSource> = Arc::new(BigQueryClient::new(
        &config.bigquery,
        &config.tracker.target_status,
    )?);
    info!("Warehouse client ready ({})", config.bigquery.collections_table);

    if config.admin_panel.credentials().is_none() {
        warn!("ADMIN_EMAIL/ADMIN_PASSWORD not set, report collection will fail");
    }
    let collector: Arc<dyn ReportCollector> = Arc::new(AdminPanelCollector::new(
        config.admin_panel.clone(),
        config.cookies_file(),
        &config.links.admin_base,
    ));

    // Initialize bot with Throttle for automatic rate limiting
    let bot = Bot::new(&config.bot_token).throttle(Limits::default());
    info!("Bot initialized with rate limiting (Throttle)");

    // Command menu shown by Telegram clients
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to set bot commands: {}", e);
    }

    // Status scheduler runs next to the dispatcher
    let tracker = StatusTracker::new(
        source.clone(),
        snapshot_store,
        &config.tracker.target_status,
    )
    .await;
    let sender = Arc::new(ReportSender::new(
        Arc::new(bot.clone()),
        chats.clone(),
        collector.clone(),
        config.links.clone(),
    ));
    let mut scheduler = StatusScheduler::new(tracker, sender, config.tracker.check_interval);
    let scheduler_handle = scheduler.handle();
    let scheduler_task = tokio::spawn(async move { scheduler.start().await });
    info!("Status scheduler started");

    let state = AppState::new(
        users,
        chats,
        source,
        collector,
        config.links.clone(),
        config.tracker.target_status.clone(),
    );
    let dispatcher = bot::build_dispatcher(bot.clone(), state);

    bot::run(bot, dispatcher).await;

    info!("Dispatcher stopped, waiting for the scheduler to finish its tick...");
    scheduler_handle.stop();
    if let Err(e) = scheduler_task.await {
        warn!("Status scheduler task ended abnormally: {}", e);
    }
    info!("Status scheduler {:?}", scheduler_handle.state());

    Ok(())
}
