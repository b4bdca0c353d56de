//! Fan-out and collaborator error types.

use thiserror::Error;

/// Boxed transport-level cause.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The transport refused or failed the publish. Never retried here.
    #[error("Failed to publish {event_type}: {source}")]
    PublishFailed {
        event_type: String,
        #[source]
        source: TransportError,
    },

    /// The event could not be serialized into a message body.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur while fetching secrets.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// No secret bundle is stored under the name.
    #[error("Secret not found: {0}")]
    NotFound(String),

    /// The bundle exists but lacks a required key.
    #[error("Secret {name} has no key {key}")]
    MissingKey { name: String, key: &'static str },

    /// The secrets backend failed.
    #[error("Secrets backend error: {0}")]
    Backend(String),
}

/// Errors that can occur while sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The recipient was rejected.
    #[error("Recipient rejected: {0}")]
    Rejected(String),

    /// The mail transport failed.
    #[error("Notification transport error: {0}")]
    Transport(String),
}
