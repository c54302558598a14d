//! Collaborator seams: where transactions come from, where subscribers
//! live, and where alerts go.

use crate::error::{DeliveryError, StoreError};
use async_trait::async_trait;
use walletwatch_core::{SubscriberSnapshot, Transaction, WalletAddress};

/// Source of recent transactions and balances for a wallet.
///
/// Implementations absorb their own failures: a failed fetch yields an empty
/// page or an unknown balance, never an error, so one wallet's outage cannot
/// abort a tick.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Most recent transactions, newest first.
    async fn fetch_recent_transactions(&self, wallet: &WalletAddress) -> Vec<Transaction>;

    /// Native balance in SOL, if it could be fetched.
    async fn fetch_balance(&self, wallet: &WalletAddress) -> Option<f64>;
}

/// Read access to registered subscribers.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Snapshot of all subscribers. Malformed records are normalized, not rejected.
    async fn load_subscribers(&self) -> Result<SubscriberSnapshot, StoreError>;
}

/// Delivery capability for composed alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver `message` about `wallet`.
    ///
    /// `recipient` is the chat id for chat subscribers and `None` for device
    /// subscribers, whose routing is the sink's responsibility.
    async fn deliver(
        &self,
        recipient: Option<&str>,
        message: &str,
        wallet: &WalletAddress,
    ) -> Result<(), DeliveryError>;
}
