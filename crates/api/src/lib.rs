//! Webhook ingress server and queue workers for the payment event pipeline.
//!
//! The HTTP side verifies and normalizes provider webhooks and publishes
//! canonical events to an in-process topic. Queue workers feed the orders and
//! notifications consumers from the queues subscribed to that topic.

pub mod config;
pub mod error;
pub mod routes;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use consumers::{
    BatchConsumer, NOTIFICATIONS_CONSUMER, NotificationHandler, ORDERS_CONSUMER, OrderHandler,
};
use domain::{EventType, SignatureVerifier, WebhookIngress};
use fanout::{
    EventPublisher, InMemoryQueue, InMemoryTopic, Notifier, SecretStore, SubscriptionOptions,
};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use tower_http::trace::TraceLayer;

use config::Config;
use worker::QueueWorker;

/// Topic identifier for the in-process fan-out.
pub const TOPIC_ARN: &str = "arn:local:payment-events";

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub ingress: WebhookIngress,
    pub secrets: Arc<dyn SecretStore>,
    pub secrets_name: String,
    pub publisher: Arc<dyn EventPublisher>,
    pub orders: Arc<dyn OrderStore>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/webhooks/stripe", post(routes::webhooks::receive))
        .route("/orders/{id}", get(routes::orders::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

/// The wired pipeline: HTTP state, the topic and one worker per queue.
pub struct Pipeline {
    pub state: Arc<AppState>,
    pub topic: InMemoryTopic,
    pub orders_queue: InMemoryQueue,
    pub notifications_queue: InMemoryQueue,
    pub workers: Vec<QueueWorker>,
}

/// Wires ingress, fan-out and both consumers around the given collaborators.
///
/// The orders queue receives relay-wrapped deliveries of every event type;
/// the notifications queue receives raw deliveries of order and payment
/// events only.
pub async fn create_pipeline(
    config: &Config,
    orders: Arc<dyn OrderStore>,
    secrets: Arc<dyn SecretStore>,
    notifier: Arc<dyn Notifier>,
) -> Pipeline {
    let topic = InMemoryTopic::new(TOPIC_ARN);
    let orders_queue = InMemoryQueue::new(ORDERS_CONSUMER);
    let notifications_queue = InMemoryQueue::new(NOTIFICATIONS_CONSUMER);

    topic
        .subscribe(orders_queue.clone(), SubscriptionOptions::wrapped())
        .await;
    topic
        .subscribe(
            notifications_queue.clone(),
            SubscriptionOptions::raw().only([EventType::OrderCreated, EventType::PaymentConfirmed]),
        )
        .await;

    let order_handler = Arc::new(OrderHandler::new(orders.clone()));
    let mut orders_consumer =
        BatchConsumer::new(ORDERS_CONSUMER).with_item_timeout(config.item_timeout);
    for event_type in EventType::ALL {
        orders_consumer.register(event_type, order_handler.clone());
    }

    let notification_handler = Arc::new(NotificationHandler::new(notifier));
    let mut notifications_consumer = BatchConsumer::new(NOTIFICATIONS_CONSUMER)
        .with_secrets(secrets.clone(), config.secrets_name.clone())
        .with_item_timeout(config.item_timeout);
    notifications_consumer.register(EventType::OrderCreated, notification_handler.clone());
    notifications_consumer.register(EventType::PaymentConfirmed, notification_handler);

    let workers = [
        (orders_queue.clone(), orders_consumer),
        (notifications_queue.clone(), notifications_consumer),
    ]
    .into_iter()
    .map(|(queue, consumer)| {
        QueueWorker::new(queue, Arc::new(consumer))
            .with_batch_size(config.batch_size)
            .with_max_receive_count(config.max_receive_count)
            .with_poll_interval(config.poll_interval)
    })
    .collect();

    let state = Arc::new(AppState {
        ingress: WebhookIngress::new(SignatureVerifier::new(config.tolerance_secs)),
        secrets,
        secrets_name: config.secrets_name.clone(),
        publisher: Arc::new(topic.clone()),
        orders,
    });

    Pipeline {
        state,
        topic,
        orders_queue,
        notifications_queue,
        workers,
    }
}
