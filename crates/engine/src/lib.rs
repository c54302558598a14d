//! Wallet activity detection and alert dispatch.
//!
//! The pieces, leaves first:
//! - `cursor` - per-wallet last-seen signature tracking
//! - `filter` - subscriber filter evaluation
//! - `composer` - transaction scoring and alert text
//! - `dedup` - time-windowed duplicate suppression
//! - `poller` - the tick loop tying them together
//!
//! Collaborators (transaction source, subscriber store, alert sink) are
//! injected through the traits in `traits`.

pub mod composer;
pub mod cursor;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod poller;
pub mod traits;

pub use composer::{compose, score, Grade, Score};
pub use cursor::CursorTracker;
pub use dedup::{fingerprint, DedupGate, DEFAULT_DEDUP_WINDOW};
pub use error::*;
pub use filter::matches;
pub use poller::*;
pub use traits::*;
