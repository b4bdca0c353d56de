//! Domain error types.

use thiserror::Error;

use crate::normalizer::NormalizeError;
use crate::signature::SignatureError;

/// Errors that can occur while accepting an inbound webhook.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The signature header is malformed, stale, or does not match.
    #[error("Signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    /// The body is not a provider event.
    #[error("Invalid webhook body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The provider event could not be normalized.
    #[error("Normalization failed: {0}")]
    Normalize(#[from] NormalizeError),
}
