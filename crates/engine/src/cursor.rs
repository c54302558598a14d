//! Per-wallet polling cursors.
//!
//! A cursor is the newest signature seen for a wallet on the previous poll.
//! Cursors live in memory only and reset on restart.

use compact_str::CompactString;
use dashmap::DashMap;
use walletwatch_core::{Transaction, WalletAddress};

/// Tracks the last-seen signature per wallet.
#[derive(Debug, Default)]
pub struct CursorTracker {
    last_seen: DashMap<WalletAddress, CompactString>,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transactions in `page` newer than the stored cursor, newest first.
    ///
    /// `page` must be newest first. The first page seen for a wallet only
    /// sets the baseline and yields nothing. Every non-empty page moves the
    /// cursor to its newest signature, even when nothing new was found.
    pub fn new_transactions_since(
        &self,
        wallet: &WalletAddress,
        page: Vec<Transaction>,
    ) -> Vec<Transaction> {
        let newest = match page.first() {
            Some(tx) => tx.signature.clone(),
            None => return Vec::new(),
        };

        let previous = self.last_seen.insert(wallet.clone(), newest);
        let Some(last) = previous else {
            return Vec::new();
        };

        page.into_iter()
            .take_while(|tx| tx.signature != last)
            .collect()
    }

    /// Current cursor for a wallet.
    pub fn cursor(&self, wallet: &WalletAddress) -> Option<String> {
        self.last_seen.get(wallet).map(|s| s.to_string())
    }

    /// Number of wallets with a cursor.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
