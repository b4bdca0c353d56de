//! Integration tests for publishing through the in-memory topic.

use chrono::{TimeZone, Utc};
use common::{Currency, IdempotencyKey, Metadata};
use domain::{CanonicalEvent, EventType, InboundEvent, OrderCreated, PaymentConfirmed};
use fanout::{EventPublisher, InMemoryQueue, InMemoryTopic, SubscriptionOptions};

fn order_created(id: &str) -> CanonicalEvent {
    CanonicalEvent::from(OrderCreated {
        session_id: IdempotencyKey::new(id),
        payment_intent_id: Some(format!("pi_{id}")),
        customer_email: "a@b.com".to_string(),
        customer_id: None,
        amount_total: 2500,
        currency: Currency::parse("usd").unwrap(),
        metadata: Metadata::new(),
        timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    })
}

fn payment_confirmed(id: &str) -> CanonicalEvent {
    CanonicalEvent::from(PaymentConfirmed {
        payment_intent_id: IdempotencyKey::new(id),
        amount: 2500,
        currency: Currency::parse("usd").unwrap(),
        customer_id: "cus_1".to_string(),
        receipt_email: Some("a@b.com".to_string()),
        metadata: Metadata::new(),
        timestamp: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
    })
}

async fn drain(queue: &InMemoryQueue) -> Vec<CanonicalEvent> {
    let mut events = Vec::new();
    for message in queue.receive_batch(100).await {
        match message.envelope.decode().unwrap() {
            InboundEvent::Known(event) => events.push(event),
            other => panic!("unexpected {other:?}"),
        }
        queue.ack(&message.envelope.message_id).await;
    }
    events
}

#[tokio::test]
async fn every_consumer_sees_its_events_in_publish_order() {
    let topic = InMemoryTopic::new("arn:local:payments");
    let orders = InMemoryQueue::new("orders");
    let notifications = InMemoryQueue::new("notifications");
    topic.subscribe(orders.clone(), SubscriptionOptions::wrapped()).await;
    topic
        .subscribe(
            notifications.clone(),
            SubscriptionOptions::raw().only([EventType::OrderCreated]),
        )
        .await;

    let published = vec![
        order_created("cs_1"),
        payment_confirmed("pi_cs_1"),
        order_created("cs_2"),
    ];
    for event in &published {
        topic.publish(event).await.unwrap();
    }

    assert_eq!(drain(&orders).await, published);
    assert_eq!(
        drain(&notifications).await,
        vec![order_created("cs_1"), order_created("cs_2")]
    );
    assert_eq!(orders.in_flight_len().await, 0);
}

#[tokio::test]
async fn publish_without_subscribers_still_succeeds() {
    let topic = InMemoryTopic::new("arn:local:empty");
    let receipt = topic.publish(&order_created("cs_1")).await.unwrap();
    assert!(!receipt.message_id.as_str().is_empty());
}
