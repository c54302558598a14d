//! Telegram bot handlers.

use crate::config::{parse_filter_args, AlertLogEntry};
use crate::db::{Database, DbError};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tracing::info;
use walletwatch_core::WalletAddress;

/// Alerts shown by `/alerts`.
const ALERT_DIGEST_LEN: usize = 5;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Invalid chat id: {0:?}")]
    InvalidChatId(String),
}

/// Bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Register this chat for alerts")]
    Start,
    #[command(description = "Watch a wallet. Usage: /watch <address>")]
    Watch(String),
    #[command(description = "Stop watching a wallet. Usage: /unwatch <address>")]
    Unwatch(String),
    #[command(description = "List watched wallets")]
    Wallets,
    #[command(
        description = "Set alert filter. Usage: /filter all | swap | sol [min] | spl [min] | types SWAP,TRANSFER"
    )]
    Filter(String),
    #[command(description = "Show recent alerts")]
    Alerts,
    #[command(description = "Show help")]
    Help,
}

/// Plain-text wallet listing for `/wallets`.
pub fn format_wallet_list(wallets: &[WalletAddress]) -> String {
    if wallets.is_empty() {
        return "No wallets watched. Use /watch <address> to add one.".to_string();
    }
    let mut text = format!("Watching {} wallet(s):", wallets.len());
    for (i, wallet) in wallets.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, wallet));
    }
    text
}

/// HTML digest of the newest alerts for `/alerts`. Entries are already HTML.
pub fn format_alert_digest(alerts: &[AlertLogEntry]) -> String {
    if alerts.is_empty() {
        return "No alerts yet.".to_string();
    }
    let start = alerts.len().saturating_sub(ALERT_DIGEST_LEN);
    alerts[start..]
        .iter()
        .map(|entry| entry.message.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn parse_chat_id(chat_id: &str) -> Result<ChatId, TelegramError> {
    chat_id
        .trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| TelegramError::InvalidChatId(chat_id.to_string()))
}

/// Telegram bot wrapper.
pub struct TelegramBot {
    bot: Bot,
    db: Database,
}

impl TelegramBot {
    /// Create a new bot with the given token.
    pub fn new(token: &str, db: Database) -> Self {
        let bot = Bot::new(token);
        Self { bot, db }
    }

    /// Get the underlying bot for sending messages.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Send an HTML alert message to a chat.
    pub async fn send_alert(&self, chat_id: &str, message: &str) -> Result<(), TelegramError> {
        let chat_id = parse_chat_id(chat_id)?;
        self.bot
            .send_message(chat_id, message)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    /// Run the bot command handler until the task is cancelled.
    pub async fn run(self: Arc<Self>) {
        let bot = self.bot.clone();
        let handler = Update::filter_message().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command| {
                let this = Arc::clone(&self);
                async move { this.handle_command(bot, msg, cmd).await }
            },
        );

        info!("Telegram command handler started");
        Dispatcher::builder(bot, handler)
            .build()
            .dispatch()
            .await;
    }

    async fn handle_command(
        &self,
        bot: Bot,
        msg: Message,
        cmd: Command,
    ) -> Result<(), TelegramError> {
        let chat_id = msg.chat.id.to_string();

        match cmd {
            Command::Start => {
                let chat = self.db.get_or_create_chat(&chat_id).await?;
                let text = format!(
                    "Welcome to the wallet watcher!\n\n\
                     Your chat is now registered.\n\
                     Current settings:\n\
                     - Wallets: {}\n\
                     - Filter: {}\n\n\
                     Use /help to see available commands.",
                    chat.wallets.len(),
                    chat.filter.describe()
                );
                bot.send_message(msg.chat.id, text).await?;
            }

            Command::Watch(value) => match self.db.add_wallet(&chat_id, &value).await {
                Ok(wallets) => {
                    info!(chat_id = %chat_id, wallet = %value.trim(), "Wallet watched");
                    bot.send_message(
                        msg.chat.id,
                        format!(
                            "Watching {}\nTotal wallets: {}",
                            value.trim(),
                            wallets.len()
                        ),
                    )
                    .await?;
                }
                Err(DbError::InvalidWallet(_)) => {
                    bot.send_message(msg.chat.id, "Usage: /watch <address>")
                        .await?;
                }
                Err(e) => return Err(e.into()),
            },

            Command::Unwatch(value) => {
                if value.trim().is_empty() {
                    bot.send_message(msg.chat.id, "Usage: /unwatch <address>")
                        .await?;
                } else {
                    let wallets = self.db.remove_wallet(&chat_id, &value).await?;
                    bot.send_message(
                        msg.chat.id,
                        format!(
                            "Stopped watching {}\nTotal wallets: {}",
                            value.trim(),
                            wallets.len()
                        ),
                    )
                    .await?;
                }
            }

            Command::Wallets => {
                let wallets = self.db.list_wallets(&chat_id).await?;
                bot.send_message(msg.chat.id, format_wallet_list(&wallets))
                    .await?;
            }

            Command::Filter(value) => match parse_filter_args(&value) {
                Ok(filter) => {
                    self.db.set_chat_filter(&chat_id, &filter).await?;
                    bot.send_message(msg.chat.id, format!("Filter set: {}", filter.describe()))
                        .await?;
                }
                Err(reason) => {
                    bot.send_message(
                        msg.chat.id,
                        format!(
                            "Invalid filter ({})\nUsage: /filter all | swap | sol [min] | spl [min] | types SWAP,TRANSFER",
                            reason
                        ),
                    )
                    .await?;
                }
            },

            Command::Alerts => {
                let alerts = self.db.recent_alerts(&chat_id).await?;
                bot.send_message(msg.chat.id, format_alert_digest(&alerts))
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::Help => {
                bot.send_message(msg.chat.id, Command::descriptions().to_string())
                    .await?;
            }
        }

        Ok(())
    }
}
