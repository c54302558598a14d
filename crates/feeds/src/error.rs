//! Error types for indexer and RPC fetches.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching from the indexer or RPC node.
///
/// These never leave the crate's public fetch methods: the adapter logs them
/// and reports an empty page or unknown balance instead.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    ConnectionFailed(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs carry the API key; keep them out of logs.
        let err = err.without_url();
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::ConnectionFailed(err.to_string())
        }
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::ConnectionFailed(_) | FeedError::Timeout(_) => true,
            FeedError::HttpStatus(code) => *code == 429 || *code >= 500,
            FeedError::ParseError(_) | FeedError::Rpc(_) => false,
        }
    }

    /// Returns a suggested back-off for this error type, if applicable.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            FeedError::HttpStatus(429) => Some(Duration::from_secs(60)),
            FeedError::ConnectionFailed(_) => Some(Duration::from_secs(5)),
            FeedError::Timeout(_) => Some(Duration::from_secs(2)),
            FeedError::HttpStatus(code) if *code >= 500 => Some(Duration::from_secs(5)),
            FeedError::HttpStatus(_) | FeedError::ParseError(_) | FeedError::Rpc(_) => None,
        }
    }
}
