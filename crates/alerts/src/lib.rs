//! Subscriber storage and alert delivery.
//!
//! This crate provides:
//! - SQLite-based subscriber storage and per-key alert log
//! - Telegram bot integration for notifications and chat commands
//! - The delivery capability used by the polling engine

pub mod config;
pub mod db;
pub mod notifier;
pub mod telegram;

pub use config::{parse_filter_args, AlertLogEntry, MAX_ALERTS_PER_KEY};
pub use db::{Database, DbError};
pub use notifier::{AlertDispatcher, NotifierError};
pub use telegram::{Command, TelegramBot, TelegramError};
