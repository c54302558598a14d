//! Wallet Watcher - Headless Server
//!
//! Polls watched Solana wallets and delivers activity alerts to Telegram chats
//! and device alert logs.

mod config;

use clap::Parser;
use config::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use walletwatch_alerts::{AlertDispatcher, Database, TelegramBot};
use walletwatch_engine::{Poller, PollerConfig};
use walletwatch_feeds::HeliusClient;

/// Time allowed for an in-flight tick to finish on shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Wallet Watcher CLI
#[derive(Parser, Debug)]
#[command(name = "walletwatch")]
#[command(about = "Solana wallet activity alerts", long_about = None)]
struct Args {
    /// Milliseconds between polls
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 15_000)]
    poll_interval_ms: u64,

    /// Milliseconds during which identical alerts are suppressed
    #[arg(long, env = "DEDUP_WINDOW_MS", default_value_t = 45_000)]
    dedup_window_ms: u64,

    /// Helius API key
    #[arg(long, env = "HELIUS_API_KEY", hide_env_values = true)]
    helius_api_key: String,

    /// Helius API base URL
    #[arg(long, env = "HELIUS_API_URL", default_value = "https://api.helius.xyz")]
    helius_api_url: String,

    /// Solana JSON-RPC URL for balances
    #[arg(long, env = "RPC_URL", default_value = "https://api.mainnet-beta.solana.com")]
    rpc_url: String,

    /// Transactions fetched per wallet per poll
    #[arg(long, default_value_t = 20)]
    page_limit: u32,

    /// Telegram bot token (chat alerts disabled if absent)
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: Option<String>,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://walletwatch.db")]
    database_url: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl From<Args> for AppConfig {
    fn from(args: Args) -> Self {
        AppConfig {
            poll_interval_ms: args.poll_interval_ms,
            dedup_window_ms: args.dedup_window_ms,
            helius_api_key: args.helius_api_key,
            helius_api_url: args.helius_api_url,
            rpc_url: args.rpc_url,
            page_limit: args.page_limit,
            telegram_bot_token: args.telegram_bot_token,
            database_url: args.database_url,
            log_level: args.log_level,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_logging(level: &str) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

async fn run_stats_reporter(poller: Arc<Poller>) {
    let mut interval = tokio::time::interval(STATS_INTERVAL);
    // First tick is immediate and has nothing to report
    interval.tick().await;

    loop {
        interval.tick().await;
        let summary = poller.stats().summary();
        info!(
            "📊 Stats | Ticks: {} (skipped {}, failed {}) | Txs: {} | Duplicates: {} | Alerts: {} | Failures: {}",
            summary.ticks_completed,
            summary.ticks_skipped,
            summary.ticks_failed,
            summary.transactions_seen,
            summary.duplicates_suppressed,
            summary.alerts_delivered,
            summary.delivery_failures
        );
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let config: AppConfig = Args::parse().into();

    init_logging(&config.log_level);

    info!("🚀 Wallet watcher starting...");
    info!("  Poll interval: {} ms", config.poll_interval_ms);
    info!("  Dedup window: {} ms", config.dedup_window_ms);
    info!("  Page limit: {}", config.page_limit);
    info!("  Database: {}", config.database_url);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    let db = match Database::connect(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let source = match HeliusClient::new((&config).into()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    // Telegram is optional; device alert logs work without it
    let bot = config
        .telegram_token()
        .map(|token| Arc::new(TelegramBot::new(token, db.clone())));
    let bot_handle = match &bot {
        Some(bot) => {
            info!("  Telegram: enabled");
            let bot = Arc::clone(bot);
            Some(tokio::spawn(async move { bot.run().await }))
        }
        None => {
            warn!("  Telegram: disabled (no bot token), chat alerts will fail");
            None
        }
    };

    let sink = Arc::new(AlertDispatcher::new(db.clone(), bot));
    let poller = match Poller::new(PollerConfig::from(&config), source, Arc::new(db), sink) {
        Ok(poller) => Arc::new(poller),
        Err(e) => {
            error!("Failed to create poller: {}", e);
            std::process::exit(2);
        }
    };

    let handle = Arc::clone(&poller).start();

    let stats_poller = Arc::clone(&poller);
    let stats_handle = tokio::spawn(async move {
        run_stats_reporter(stats_poller).await;
    });

    // Handle shutdown
    info!("Press Ctrl+C to stop...");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }

    warn!("Shutdown signal received");
    if !handle.stop_and_drain(SHUTDOWN_DRAIN).await {
        warn!("Exiting with a tick still in flight");
    }

    stats_handle.abort();
    if let Some(bot_handle) = bot_handle {
        bot_handle.abort();
    }

    // Final stats
    let summary = poller.stats().summary();
    info!("📈 Final Stats:");
    info!("  Ticks completed: {}", summary.ticks_completed);
    info!("  Ticks skipped: {}", summary.ticks_skipped);
    info!("  Ticks failed: {}", summary.ticks_failed);
    info!("  Transactions seen: {}", summary.transactions_seen);
    info!("  Alerts delivered: {}", summary.alerts_delivered);
    info!("  Delivery failures: {}", summary.delivery_failures);

    info!("👋 Wallet watcher stopped");
}
