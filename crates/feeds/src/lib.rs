//! On-chain data sources for the wallet watcher.
//!
//! ## Architecture
//!
//! - `helius` - Enhanced-transactions client plus JSON-RPC balance lookups
//! - `error` - Internal fetch errors, absorbed at the `TransactionSource` seam

pub mod error;
pub mod helius;

pub use error::*;
pub use helius::{parse_balance, parse_transactions, HeliusClient, HeliusConfig};
