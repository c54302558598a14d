//! Alert subscribers.

use crate::filter::FilterConfig;
use crate::wallet::WalletAddress;
use serde::{Deserialize, Serialize};

/// A chat (e.g. Telegram) that follows one or more wallets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSubscriber {
    /// Chat identifier, usable directly by the transport.
    pub chat_id: String,
    pub wallets: Vec<WalletAddress>,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl ChatSubscriber {
    pub fn new(chat_id: impl Into<String>, wallets: Vec<WalletAddress>) -> Self {
        Self {
            chat_id: chat_id.into(),
            wallets,
            filter: FilterConfig::default(),
        }
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }
}

/// A mobile device bound to a single wallet.
///
/// Devices have no pushed delivery address; they read their wallet's alert log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSubscriber {
    /// Device registration token.
    pub token: String,
    pub wallet: WalletAddress,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl DeviceSubscriber {
    pub fn new(token: impl Into<String>, wallet: WalletAddress) -> Self {
        Self {
            token: token.into(),
            wallet,
            filter: FilterConfig::default(),
        }
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }
}

/// All subscribers as read from the store at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriberSnapshot {
    #[serde(default)]
    pub chats: Vec<ChatSubscriber>,
    #[serde(default)]
    pub devices: Vec<DeviceSubscriber>,
}

impl SubscriberSnapshot {
    pub fn is_empty(&self) -> bool {
        self.chats.is_empty() && self.devices.is_empty()
    }
}
