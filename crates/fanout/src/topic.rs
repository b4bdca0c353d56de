//! In-memory pub/sub topic fanning out to queues.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::MessageId;
use domain::{CanonicalEvent, EventType, QueuedEnvelope, RelayEnvelope};
use tokio::sync::RwLock;

use crate::error::PublishError;
use crate::publisher::{ATTR_EVENT_TYPE, DeliveryReceipt, EventPublisher, routing_attributes};
use crate::queue::InMemoryQueue;

/// How a queue is attached to the topic.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionOptions {
    /// Deliver only these event types. Evaluated on the attribute, not the body.
    pub event_types: Option<Vec<EventType>>,
    /// Deliver the body as-is instead of wrapping it in a relay notification.
    pub raw_delivery: bool,
}

impl SubscriptionOptions {
    pub fn raw() -> Self {
        Self {
            event_types: None,
            raw_delivery: true,
        }
    }

    pub fn wrapped() -> Self {
        Self::default()
    }

    pub fn only(mut self, event_types: impl IntoIterator<Item = EventType>) -> Self {
        self.event_types = Some(event_types.into_iter().collect());
        self
    }

    fn accepts(&self, event_type: &str) -> bool {
        self.event_types
            .as_ref()
            .is_none_or(|types| types.iter().any(|t| t.as_str() == event_type))
    }
}

#[derive(Debug, Clone)]
struct Subscription {
    queue: InMemoryQueue,
    options: SubscriptionOptions,
}

#[derive(Debug, thiserror::Error)]
#[error("topic {0} is unavailable")]
struct TopicUnavailable(String);

/// In-memory topic.
///
/// Every publish is copied to each matching subscription. Relay-wrapped
/// subscriptions receive a notification document whose `Message` is the
/// canonical body.
#[derive(Debug, Clone)]
pub struct InMemoryTopic {
    arn: Arc<str>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    fail_on_publish: Arc<AtomicBool>,
}

impl InMemoryTopic {
    pub fn new(arn: impl Into<String>) -> Self {
        Self {
            arn: Arc::from(arn.into()),
            subscriptions: Arc::default(),
            fail_on_publish: Arc::default(),
        }
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// Attaches a queue.
    pub async fn subscribe(&self, queue: InMemoryQueue, options: SubscriptionOptions) {
        tracing::debug!(
            topic = %self.arn,
            queue = queue.name(),
            raw = options.raw_delivery,
            "Queue subscribed"
        );
        self.subscriptions
            .write()
            .await
            .push(Subscription { queue, options });
    }

    /// Configures the topic to fail every publish.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventPublisher for InMemoryTopic {
    #[tracing::instrument(
        skip(self, event),
        fields(event_type = %event.event_type(), key = %event.idempotency_key())
    )]
    async fn publish(&self, event: &CanonicalEvent) -> Result<DeliveryReceipt, PublishError> {
        let event_type = event.event_type().as_str();

        if self.fail_on_publish.load(Ordering::SeqCst) {
            metrics::counter!("events_publish_failures", "event_type" => event_type).increment(1);
            return Err(PublishError::PublishFailed {
                event_type: event_type.to_string(),
                source: Box::new(TopicUnavailable(self.arn.to_string())),
            });
        }

        let body = event.to_json()?;
        let attributes = routing_attributes(event);
        let message_id = MessageId::new();

        let subscriptions = self.subscriptions.read().await;
        let mut delivered = 0usize;

        for subscription in subscriptions.iter() {
            let routed = attributes
                .get(ATTR_EVENT_TYPE)
                .is_some_and(|t| subscription.options.accepts(t));
            if !routed {
                continue;
            }

            let envelope = if subscription.options.raw_delivery {
                QueuedEnvelope::direct(MessageId::new(), body.clone())
            } else {
                let relay =
                    RelayEnvelope::wrap(message_id.as_str(), self.arn(), body.clone(), &attributes);
                QueuedEnvelope::relayed(MessageId::new(), serde_json::to_vec(&relay)?)
            };
            subscription.queue.send(envelope).await;
            delivered += 1;
        }

        metrics::counter!("events_published", "event_type" => event_type).increment(1);
        tracing::info!(message_id = %message_id, delivered, "Event published");

        Ok(DeliveryReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::{Currency, IdempotencyKey, Metadata};
    use domain::{InboundEvent, OrderUpdated, PaymentConfirmed};

    fn payment() -> CanonicalEvent {
        CanonicalEvent::from(PaymentConfirmed {
            payment_intent_id: IdempotencyKey::new("pi_1"),
            amount: 2500,
            currency: Currency::parse("usd").unwrap(),
            customer_id: "cus_1".to_string(),
            receipt_email: None,
            metadata: Metadata::new(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        })
    }

    fn invoice() -> CanonicalEvent {
        CanonicalEvent::from(OrderUpdated {
            invoice_id: IdempotencyKey::new("in_1"),
            customer_id: None,
            subscription_id: None,
            amount_paid: Some(100),
            currency: None,
            metadata: Metadata::new(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_fan_out_to_raw_and_wrapped_queues() {
        let topic = InMemoryTopic::new("arn:local:payments");
        let raw = InMemoryQueue::new("raw");
        let wrapped = InMemoryQueue::new("wrapped");
        topic.subscribe(raw.clone(), SubscriptionOptions::raw()).await;
        topic
            .subscribe(wrapped.clone(), SubscriptionOptions::wrapped())
            .await;

        topic.publish(&payment()).await.unwrap();

        let raw_msg = raw.receive_batch(10).await.remove(0);
        let wrapped_msg = wrapped.receive_batch(10).await.remove(0);
        assert!(!raw_msg.envelope.relay_wrapped);
        assert!(wrapped_msg.envelope.relay_wrapped);

        assert_eq!(
            raw_msg.envelope.decode().unwrap(),
            InboundEvent::Known(payment())
        );
        assert_eq!(
            wrapped_msg.envelope.decode().unwrap(),
            InboundEvent::Known(payment())
        );

        let relay: RelayEnvelope = serde_json::from_slice(&wrapped_msg.envelope.body).unwrap();
        assert_eq!(relay.attribute("event_type"), Some("payment_confirmed"));
        assert_eq!(relay.attribute("source"), Some("stripe_webhook"));
        assert_eq!(relay.topic_arn, "arn:local:payments");
    }

    #[tokio::test]
    async fn test_event_type_filter() {
        let topic = InMemoryTopic::new("arn:local:payments");
        let payments_only = InMemoryQueue::new("payments");
        topic
            .subscribe(
                payments_only.clone(),
                SubscriptionOptions::raw().only([EventType::PaymentConfirmed]),
            )
            .await;

        topic.publish(&invoice()).await.unwrap();
        assert!(payments_only.is_empty().await);

        topic.publish(&payment()).await.unwrap();
        assert_eq!(payments_only.len().await, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_cause() {
        let topic = InMemoryTopic::new("arn:local:payments");
        let queue = InMemoryQueue::new("q");
        topic.subscribe(queue.clone(), SubscriptionOptions::raw()).await;
        topic.set_fail_on_publish(true);

        let err = topic.publish(&payment()).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::PublishFailed { ref event_type, .. } if event_type == "payment_confirmed"
        ));
        assert!(std::error::Error::source(&err).is_some());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_publish_returns_distinct_receipts() {
        let topic = InMemoryTopic::new("arn:local:payments");
        let a = topic.publish(&payment()).await.unwrap();
        let b = topic.publish(&payment()).await.unwrap();
        assert_ne!(a.message_id, b.message_id);
    }
}
