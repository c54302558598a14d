//! Wallet address identifiers.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored on-chain account address (base58 public key on Solana).
///
/// Treated as an opaque key: the only normalization applied is trimming
/// surrounding whitespace, and empty addresses are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(CompactString);

impl WalletAddress {
    /// Parse an address, trimming whitespace. Returns None for empty input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(CompactString::from(trimmed)))
        }
    }

    /// Get the address as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Short display form: first `n` and last `n` characters joined by an ellipsis.
    /// Addresses no longer than `2n` characters are returned whole.
    pub fn abbreviated(&self, n: usize) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if n == 0 || chars.len() <= n * 2 {
            return self.0.to_string();
        }
        let head: String = chars[..n].iter().collect();
        let tail: String = chars[chars.len() - n..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for WalletAddress {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Parse a list of raw addresses, dropping blanks and duplicates while
/// keeping first-seen order.
pub fn normalize_wallets<I, S>(raw: I) -> Vec<WalletAddress>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<WalletAddress> = Vec::new();
    for item in raw {
        if let Some(wallet) = WalletAddress::parse(item.as_ref()) {
            if !out.contains(&wallet) {
                out.push(wallet);
            }
        }
    }
    out
}
