//! On-chain transaction records as reported by the indexer.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Lamports per SOL.
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Native transfers below this many SOL are treated as dust when picking
/// the transfer to show in an alert.
pub const DUST_THRESHOLD_SOL: f64 = 0.001;

/// Convert lamports to SOL.
#[inline]
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL
}

/// Native SOL transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeTransfer {
    /// Amount in lamports.
    pub amount: u64,
    pub from: Option<CompactString>,
    pub to: Option<CompactString>,
}

impl NativeTransfer {
    /// Amount in SOL.
    #[inline]
    pub fn sol(&self) -> f64 {
        lamports_to_sol(self.amount)
    }
}

/// SPL token transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransfer {
    /// Amount in UI units (already scaled by the token's decimals).
    pub token_amount: f64,
    pub mint: CompactString,
    pub from: Option<CompactString>,
    pub to: Option<CompactString>,
}

/// A transaction touching a watched wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction signature.
    pub signature: CompactString,
    /// Indexer classification, e.g. "TRANSFER" or "SWAP".
    pub kind: CompactString,
    pub native_transfers: Vec<NativeTransfer>,
    pub token_transfers: Vec<TokenTransfer>,
}

/// The most relevant part of a transaction for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Headline<'a> {
    /// First non-dust native transfer, or the first native transfer if all are dust.
    Native(&'a NativeTransfer),
    /// First token transfer, when there are no native transfers.
    Token(&'a TokenTransfer),
    /// Neither kind of transfer: only the type is known.
    Bare(&'a str),
}

impl Transaction {
    /// Create a transaction with no transfers.
    pub fn new(signature: impl Into<CompactString>, kind: impl Into<CompactString>) -> Self {
        Self {
            signature: signature.into(),
            kind: kind.into(),
            native_transfers: Vec::new(),
            token_transfers: Vec::new(),
        }
    }

    /// Add a native transfer (builder style).
    pub fn with_native(mut self, amount: u64, from: &str, to: &str) -> Self {
        self.native_transfers.push(NativeTransfer {
            amount,
            from: Some(from.into()),
            to: Some(to.into()),
        });
        self
    }

    /// Add a token transfer (builder style).
    pub fn with_token(mut self, token_amount: f64, mint: &str, from: &str, to: &str) -> Self {
        self.token_transfers.push(TokenTransfer {
            token_amount,
            mint: mint.into(),
            from: Some(from.into()),
            to: Some(to.into()),
        });
        self
    }

    /// Upper-cased transaction type.
    pub fn kind_upper(&self) -> String {
        self.kind.as_str().to_uppercase()
    }

    /// Whether the indexer classified this as a swap of any flavour.
    pub fn is_swap(&self) -> bool {
        self.kind_upper().contains("SWAP")
    }

    /// Largest native transfer in lamports, 0 if there are none.
    pub fn max_native_lamports(&self) -> u64 {
        self.native_transfers
            .iter()
            .map(|t| t.amount)
            .max()
            .unwrap_or(0)
    }

    /// Pick what an alert should lead with.
    pub fn headline(&self) -> Headline<'_> {
        if let Some(first) = self.native_transfers.first() {
            let chosen = self
                .native_transfers
                .iter()
                .find(|t| t.sol() >= DUST_THRESHOLD_SOL)
                .unwrap_or(first);
            return Headline::Native(chosen);
        }
        if let Some(token) = self.token_transfers.first() {
            return Headline::Token(token);
        }
        Headline::Bare(self.kind.as_str())
    }
}
