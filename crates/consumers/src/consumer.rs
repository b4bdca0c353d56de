//! Batch consumer with per-item failure isolation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{EventType, InboundEvent, QueuedEnvelope};
use fanout::SecretStore;

use crate::handler::{BatchContext, EventHandler};
use crate::report::BatchReport;
use crate::{HandlerError, Result};

/// Default deadline for a single item's handler.
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(30);

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Handled,
    /// Unrecognized event type, or no handler registered for it.
    Ignored,
}

/// Processes batches of queued envelopes.
///
/// Each item is decoded, unwrapped from a relay notification if needed, and
/// dispatched on its `event_type`. A failing item is recorded in the report
/// and never stops its siblings. A handler that exceeds the item timeout
/// fails only its own item.
pub struct BatchConsumer {
    name: &'static str,
    handlers: HashMap<EventType, Arc<dyn EventHandler>>,
    secrets: Option<(Arc<dyn SecretStore>, String)>,
    item_timeout: Duration,
}

impl BatchConsumer {
    /// Creates a consumer with no handlers.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: HashMap::new(),
            secrets: None,
            item_timeout: DEFAULT_ITEM_TIMEOUT,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registers the handler for an event type, replacing any previous one.
    pub fn register(&mut self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(event_type, handler);
    }

    /// Fetches the named secret bundle before each batch.
    pub fn with_secrets(mut self, store: Arc<dyn SecretStore>, name: impl Into<String>) -> Self {
        self.secrets = Some((store, name.into()));
        self
    }

    /// Sets the deadline applied to each handler call.
    pub fn with_item_timeout(mut self, item_timeout: Duration) -> Self {
        self.item_timeout = item_timeout;
        self
    }

    pub fn item_timeout(&self) -> Duration {
        self.item_timeout
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    async fn setup(&self) -> std::result::Result<BatchContext, fanout::SecretsError> {
        let secrets = match &self.secrets {
            Some((store, name)) => Some(store.fetch(name).await?),
            None => None,
        };
        Ok(BatchContext { secrets })
    }

    /// Processes one batch and reports the failed items.
    ///
    /// When setup fails before dispatch, every item is reported failed.
    #[tracing::instrument(skip(self, batch), fields(consumer = self.name, batch_size = batch.len()))]
    pub async fn process_batch(&self, batch: &[QueuedEnvelope]) -> BatchReport {
        let ctx = match self.setup().await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!(error = %e, "Batch setup failed, failing every item");
                self.record_metrics(0, batch.len());
                return BatchReport::all_failed(batch);
            }
        };

        let mut report = BatchReport::new();
        let mut processed = 0usize;

        for envelope in batch {
            match self.process_item(envelope, &ctx).await {
                Ok(outcome) => {
                    processed += 1;
                    tracing::debug!(message_id = %envelope.message_id, ?outcome, "Item processed");
                }
                Err(e) => {
                    tracing::warn!(message_id = %envelope.message_id, error = %e, "Item failed");
                    report.push_failure(envelope.message_id.clone());
                }
            }
        }

        self.record_metrics(processed, report.failure_count());
        tracing::info!(processed, failed = report.failure_count(), "Batch processed");
        report
    }

    /// Decodes and dispatches a single item.
    pub async fn process_item(
        &self,
        envelope: &QueuedEnvelope,
        ctx: &BatchContext,
    ) -> Result<ItemOutcome> {
        let event = match envelope.decode()? {
            InboundEvent::Known(event) => event,
            InboundEvent::Unrecognized { event_type } => {
                tracing::info!(%event_type, "Unrecognized event type, acknowledging");
                return Ok(ItemOutcome::Ignored);
            }
        };

        let Some(handler) = self.handlers.get(&event.event_type()) else {
            tracing::debug!(event_type = %event.event_type(), "No handler registered");
            return Ok(ItemOutcome::Ignored);
        };

        tokio::time::timeout(self.item_timeout, handler.handle(&event, ctx))
            .await
            .map_err(|_| HandlerError::Timeout {
                handler: handler.name(),
                timeout: self.item_timeout,
            })??;
        Ok(ItemOutcome::Handled)
    }

    fn record_metrics(&self, processed: usize, failed: usize) {
        metrics::counter!("consumer_messages_processed", "consumer" => self.name)
            .increment(processed as u64);
        if failed > 0 {
            metrics::counter!("consumer_message_failures", "consumer" => self.name)
                .increment(failed as u64);
        }
        metrics::counter!("consumer_batches_processed", "consumer" => self.name).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::MessageId;
    use domain::{CanonicalEvent, OrderError};
    use fanout::{InMemorySecretStore, SecretBundle};
    use order_store::OrderKey;
    use tokio::sync::Mutex;

    /// Records keys it sees, fails for one chosen key and never returns for
    /// another.
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
        fail_key: Option<String>,
        hang_key: Option<String>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn name(&self) -> &'static str {
            "RecordingHandler"
        }

        async fn handle(&self, event: &CanonicalEvent, _ctx: &BatchContext) -> Result<()> {
            let key = event.idempotency_key().as_str().to_string();
            if self.hang_key.as_deref() == Some(key.as_str()) {
                std::future::pending::<()>().await;
            }
            if self.fail_key.as_deref() == Some(key.as_str()) {
                return Err(HandlerError::Order(OrderError::NotFound(
                    OrderKey::PaymentIntent(key),
                )));
            }
            self.seen.lock().await.push(key);
            Ok(())
        }
    }

    fn order_created(id: &str, message_id: &str) -> QueuedEnvelope {
        let body = serde_json::json!({
            "event_type": "order_created",
            "session_id": id,
            "payment_intent_id": null,
            "customer_email": "a@b.com",
            "customer_id": null,
            "amount_total": 100,
            "currency": "usd",
            "timestamp": 1_700_000_000
        });
        QueuedEnvelope::direct(message_id, body.to_string())
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let handler = Arc::new(RecordingHandler {
            fail_key: Some("cs_2".to_string()),
            ..Default::default()
        });
        let mut consumer = BatchConsumer::new("test");
        consumer.register(EventType::OrderCreated, handler.clone());

        let batch = vec![
            order_created("cs_1", "m-1"),
            order_created("cs_2", "m-2"),
            order_created("cs_3", "m-3"),
        ];
        let report = consumer.process_batch(&batch).await;

        assert_eq!(report.failed_ids().collect::<Vec<_>>(), vec![&MessageId::from("m-2")]);
        assert_eq!(*handler.seen.lock().await, vec!["cs_1", "cs_3"]);
    }

    #[tokio::test]
    async fn test_unknown_and_unhandled_types_succeed() {
        let consumer = BatchConsumer::new("test");
        let batch = vec![
            QueuedEnvelope::direct("m-1", r#"{"event_type":"refund_issued"}"#),
            order_created("cs_1", "m-2"),
        ];

        let report = consumer.process_batch(&batch).await;
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_decode_failure_fails_only_that_item() {
        let consumer = BatchConsumer::new("test");
        let batch = vec![
            QueuedEnvelope::direct("m-1", "not json"),
            QueuedEnvelope::direct("m-2", r#"{"no_type":true}"#),
            order_created("cs_1", "m-3"),
        ];

        let report = consumer.process_batch(&batch).await;
        assert_eq!(report.failure_count(), 2);
        assert!(!report.is_failed(&MessageId::from("m-3")));
    }

    #[tokio::test]
    async fn test_setup_failure_fails_whole_batch() {
        let secrets = InMemorySecretStore::new();
        secrets
            .insert(SecretBundle::new("webhook").with("notification_from_email", "shop@x.com"))
            .await;
        secrets.set_fail_on_fetch(true);

        let handler = Arc::new(RecordingHandler::default());
        let mut consumer = BatchConsumer::new("test").with_secrets(Arc::new(secrets), "webhook");
        consumer.register(EventType::OrderCreated, handler.clone());

        let batch = vec![order_created("cs_1", "m-1"), order_created("cs_2", "m-2")];
        let report = consumer.process_batch(&batch).await;

        assert_eq!(report.failure_count(), 2);
        assert!(handler.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_secrets_fetched_once_per_batch() {
        let secrets = InMemorySecretStore::new();
        secrets.insert(SecretBundle::new("webhook")).await;

        let mut consumer =
            BatchConsumer::new("test").with_secrets(Arc::new(secrets.clone()), "webhook");
        consumer.register(EventType::OrderCreated, Arc::new(RecordingHandler::default()));

        let batch = vec![order_created("cs_1", "m-1"), order_created("cs_2", "m-2")];
        consumer.process_batch(&batch).await;
        consumer.process_batch(&batch).await;

        assert_eq!(secrets.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_hung_handler_fails_only_its_item() {
        let handler = Arc::new(RecordingHandler {
            hang_key: Some("cs_1".to_string()),
            ..Default::default()
        });
        let mut consumer =
            BatchConsumer::new("test").with_item_timeout(Duration::from_millis(50));
        consumer.register(EventType::OrderCreated, handler.clone());

        let batch = vec![order_created("cs_1", "m-1"), order_created("cs_2", "m-2")];
        let report = tokio::time::timeout(Duration::from_secs(5), consumer.process_batch(&batch))
            .await
            .expect("batch must finish despite the hung handler");

        assert_eq!(report.failed_ids().collect::<Vec<_>>(), vec![&MessageId::from("m-1")]);
        assert_eq!(*handler.seen.lock().await, vec!["cs_2"]);

        let err = consumer
            .process_item(&batch[0], &BatchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Timeout { handler: "RecordingHandler", .. }));
    }
}
