//! Event publisher trait.

use std::collections::HashMap;

use async_trait::async_trait;
use common::MessageId;
use domain::CanonicalEvent;

use crate::error::PublishError;

/// Attribute carrying the canonical event type.
pub const ATTR_EVENT_TYPE: &str = "event_type";

/// Attribute naming the producer.
pub const ATTR_SOURCE: &str = "source";

/// Value of the `source` attribute for everything ingested from webhooks.
pub const WEBHOOK_SOURCE: &str = "stripe_webhook";

/// Opaque identifier of an accepted publish, for audit logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: MessageId,
}

/// Returns the routing attributes attached to every published event.
pub fn routing_attributes(event: &CanonicalEvent) -> HashMap<String, String> {
    HashMap::from([
        (
            ATTR_EVENT_TYPE.to_string(),
            event.event_type().as_str().to_string(),
        ),
        (ATTR_SOURCE.to_string(), WEBHOOK_SOURCE.to_string()),
    ])
}

/// Hands canonical events to a fan-out channel.
///
/// One call is one publish: implementations do not batch, retry, or
/// deduplicate. A failure is returned to the caller, never dropped.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &CanonicalEvent) -> Result<DeliveryReceipt, PublishError>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<T> {
    async fn publish(&self, event: &CanonicalEvent) -> Result<DeliveryReceipt, PublishError> {
        (**self).publish(event).await
    }
}
