//! Core data types for the wallet activity watcher.

pub mod filter;
pub mod subscriber;
pub mod transaction;
pub mod wallet;

pub use filter::*;
pub use subscriber::*;
pub use transaction::*;
pub use wallet::*;
