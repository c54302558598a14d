//! Subscriber filter evaluation.

use walletwatch_core::{FilterConfig, FilterMode, Transaction};

/// Check whether a transaction passes a subscriber's filter.
pub fn matches(tx: &Transaction, filter: &FilterConfig) -> bool {
    match filter.mode {
        FilterMode::All => true,
        FilterMode::Swap => tx.is_swap(),
        FilterMode::Types => {
            if filter.types.is_empty() {
                return false;
            }
            let kind = tx.kind_upper();
            filter.types.iter().any(|t| t.to_uppercase() == kind)
        }
        FilterMode::Sol => {
            if tx.native_transfers.is_empty() {
                return false;
            }
            if filter.min_sol <= 0.0 {
                return true;
            }
            tx.native_transfers.iter().any(|t| t.sol() >= filter.min_sol)
        }
        FilterMode::Spl => {
            if tx.token_transfers.is_empty() {
                return false;
            }
            if filter.min_token <= 0.0 {
                return true;
            }
            tx.token_transfers
                .iter()
                .any(|t| t.token_amount >= filter.min_token)
        }
    }
}
