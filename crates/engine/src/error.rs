//! Error types for the polling engine and its collaborators.

use thiserror::Error;

/// Failure reading subscribers from the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store query failed: {0}")]
    Query(String),
}

/// Failure handing an alert to the transport.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Transport not configured")]
    TransportUnavailable,

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Alert log write failed: {0}")]
    LogFailed(String),
}

/// Errors that end a tick early.
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("Failed to load subscribers: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid poller configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for poller operations.
pub type PollerResult<T> = Result<T, PollerError>;
