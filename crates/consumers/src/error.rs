//! Consumer error types.

use std::time::Duration;

use domain::{EnvelopeError, OrderError};
use fanout::{NotifyError, SecretsError};
use thiserror::Error;

/// Errors that fail a single batch item.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The queued body could not be decoded.
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Applying the event to the order failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The notifier failed.
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// A secret the handler needs is unavailable.
    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),

    /// The handler did not finish within the per-item deadline.
    #[error("Handler {handler} timed out after {timeout:?}")]
    Timeout {
        handler: &'static str,
        timeout: Duration,
    },
}

/// Result type for handler operations.
pub type Result<T> = std::result::Result<T, HandlerError>;
