//! Alert delivery: Telegram for chats, the alert log for devices.

use crate::db::{Database, DbError};
use crate::telegram::{TelegramBot, TelegramError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use walletwatch_core::WalletAddress;
use walletwatch_engine::{AlertSink, DeliveryError};

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Telegram error: {0}")]
    Telegram(#[from] TelegramError),
    #[error("Telegram transport not configured")]
    NoTransport,
}

impl From<NotifierError> for DeliveryError {
    fn from(err: NotifierError) -> Self {
        match err {
            NotifierError::NoTransport => DeliveryError::TransportUnavailable,
            NotifierError::Telegram(TelegramError::InvalidChatId(id)) => {
                DeliveryError::InvalidRecipient(id)
            }
            NotifierError::Telegram(e) => DeliveryError::SendFailed(e.to_string()),
            NotifierError::Db(e) => DeliveryError::LogFailed(e.to_string()),
        }
    }
}

/// Routes composed alerts to their destination.
///
/// Chat alerts go out over Telegram and are then recorded in the chat's
/// alert log. Device alerts are recorded under the wallet address, where
/// devices poll for them.
pub struct AlertDispatcher {
    db: Database,
    bot: Option<Arc<TelegramBot>>,
}

impl AlertDispatcher {
    /// Create a dispatcher. Without a bot, chat deliveries fail.
    pub fn new(db: Database, bot: Option<Arc<TelegramBot>>) -> Self {
        Self { db, bot }
    }

    pub fn has_transport(&self) -> bool {
        self.bot.is_some()
    }

    /// Send to a chat and record it in the chat's log.
    pub async fn notify_chat(&self, chat_id: &str, message: &str) -> Result<(), NotifierError> {
        let bot = self.bot.as_ref().ok_or(NotifierError::NoTransport)?;
        bot.send_alert(chat_id, message).await?;
        self.db.append_alert(chat_id, message).await?;
        info!(chat_id = %chat_id, "Alert sent");
        Ok(())
    }

    /// Record an alert in the wallet's log.
    ///
    /// Returns false when the newest entry already holds the same message,
    /// which happens once per extra device on the same wallet.
    pub async fn log_device_alert(
        &self,
        wallet: &WalletAddress,
        message: &str,
    ) -> Result<bool, NotifierError> {
        let key = wallet.as_str();
        if let Some(latest) = self.db.latest_alert(key).await? {
            if latest.message == message {
                debug!(wallet = %wallet, "Device alert already logged");
                return Ok(false);
            }
        }
        self.db.append_alert(key, message).await?;
        debug!(wallet = %wallet, "Device alert logged");
        Ok(true)
    }
}

#[async_trait]
impl AlertSink for AlertDispatcher {
    async fn deliver(
        &self,
        recipient: Option<&str>,
        message: &str,
        wallet: &WalletAddress,
    ) -> Result<(), DeliveryError> {
        match recipient {
            Some(chat_id) => self.notify_chat(chat_id, message).await?,
            None => {
                self.log_device_alert(wallet, message).await?;
            }
        }
        Ok(())
    }
}
