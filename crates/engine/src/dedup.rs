//! Time-windowed duplicate suppression.
//!
//! Alerts are keyed by a coarse fingerprint of (wallet, type, peak native
//! amount), so the same shape of event seen twice within the window is sent
//! once even if the signatures differ.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use walletwatch_core::{Transaction, WalletAddress};

/// Default suppression window.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(45_000);

/// Fingerprint used for duplicate suppression.
pub fn fingerprint(wallet: &WalletAddress, tx: &Transaction) -> String {
    format!(
        "{}|{}|{}",
        wallet,
        tx.kind_upper(),
        tx.max_native_lamports()
    )
}

/// Remembers when each fingerprint was last allowed through.
#[derive(Debug)]
pub struct DedupGate {
    window_ms: u64,
    last_sent: DashMap<String, u64>,
}

impl Default for DedupGate {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl DedupGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            last_sent: DashMap::new(),
        }
    }

    /// Admit `fingerprint` at `now_ms` unless it was admitted within the window.
    ///
    /// Check and record happen under the same shard lock, so two concurrent
    /// callers can never both be admitted for one window.
    pub fn allow(&self, fingerprint: &str, now_ms: u64) -> bool {
        match self.last_sent.entry(fingerprint.to_string()) {
            Entry::Occupied(mut entry) => {
                if now_ms.saturating_sub(*entry.get()) >= self.window_ms {
                    entry.insert(now_ms);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now_ms);
                true
            }
        }
    }

    /// Drop entries whose window has passed. Returns how many were removed.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let before = self.last_sent.len();
        self.last_sent
            .retain(|_, sent| now_ms.saturating_sub(*sent) < self.window_ms);
        before.saturating_sub(self.last_sent.len())
    }

    /// Number of tracked fingerprints.
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fingerprint_shape() {
        let wallet = WalletAddress::parse("W").unwrap();
        let tx = Transaction::new("s1", "swap")
            .with_native(10, "a", "b")
            .with_native(500, "a", "b");
        assert_eq!(fingerprint(&wallet, &tx), "W|SWAP|500");
        assert_eq!(
            fingerprint(&wallet, &Transaction::new("s2", "Transfer")),
            "W|TRANSFER|0"
        );
    }

    #[test]
    fn test_fingerprint_ignores_signature() {
        let wallet = WalletAddress::parse("W").unwrap();
        let a = Transaction::new("s1", "TRANSFER").with_native(7, "x", "y");
        let b = Transaction::new("s2", "TRANSFER").with_native(7, "p", "q");
        assert_eq!(fingerprint(&wallet, &a), fingerprint(&wallet, &b));
    }

    #[test]
    fn test_allow_within_window() {
        let gate = DedupGate::default();
        assert!(gate.allow("fp", 1_000));
        assert!(!gate.allow("fp", 1_000 + 44_999));
    }

    #[test]
    fn test_allow_after_window() {
        let gate = DedupGate::default();
        assert!(gate.allow("fp", 1_000));
        assert!(gate.allow("fp", 1_000 + 45_000));
        // Re-admission restarts the window
        assert!(!gate.allow("fp", 1_000 + 50_000));
    }

    #[test]
    fn test_rejection_does_not_extend_window() {
        let gate = DedupGate::default();
        assert!(gate.allow("fp", 0));
        assert!(!gate.allow("fp", 30_000));
        assert!(gate.allow("fp", 45_000));
    }

    #[test]
    fn test_distinct_fingerprints_independent() {
        let gate = DedupGate::default();
        assert!(gate.allow("a", 0));
        assert!(gate.allow("b", 0));
        assert_eq!(gate.len(), 2);
    }

    #[test]
    fn test_custom_window() {
        let gate = DedupGate::new(Duration::from_secs(1));
        assert!(gate.allow("fp", 0));
        assert!(!gate.allow("fp", 999));
        assert!(gate.allow("fp", 1_000));
    }

    #[test]
    fn test_sweep_removes_expired() {
        let gate = DedupGate::default();
        gate.allow("old", 0);
        gate.allow("new", 40_000);
        assert_eq!(gate.sweep(50_000), 1);
        assert_eq!(gate.len(), 1);
        // Swept entries are admitted again
        assert!(gate.allow("old", 50_000));
        assert!(!gate.allow("new", 50_000));
    }
}
