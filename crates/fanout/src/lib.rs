//! Fan-out transport and external collaborators.
//!
//! This crate provides:
//! - The `EventPublisher` trait and an in-memory topic that copies each
//!   publish to subscribed queues, raw or relay-wrapped
//! - An in-memory at-least-once queue with visibility and dead letters
//! - The secrets collaborator
//! - The black-box notifier

pub mod error;
pub mod notifier;
pub mod publisher;
pub mod queue;
pub mod secrets;
pub mod topic;

pub use error::{NotifyError, PublishError, SecretsError, TransportError};
pub use notifier::{InMemoryNotifier, Notification, Notifier, TracingNotifier};
pub use publisher::{
    ATTR_EVENT_TYPE, ATTR_SOURCE, DeliveryReceipt, EventPublisher, WEBHOOK_SOURCE,
    routing_attributes,
};
pub use queue::{InMemoryQueue, ReceivedMessage};
pub use secrets::{
    FROM_EMAIL_KEY, InMemorySecretStore, PREVIOUS_WEBHOOK_SECRET_KEY, SecretBundle, SecretStore,
    WEBHOOK_SECRET_KEY,
};
pub use topic::{InMemoryTopic, SubscriptionOptions};
