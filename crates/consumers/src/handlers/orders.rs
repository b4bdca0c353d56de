use async_trait::async_trait;
use domain::{Applied, CanonicalEvent, OrderStateMachine};
use order_store::OrderStore;

use crate::Result;
use crate::handler::{BatchContext, EventHandler};

/// Drives the order state machine from the orders queue.
pub struct OrderHandler<S: OrderStore> {
    machine: OrderStateMachine<S>,
}

impl<S: OrderStore> OrderHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            machine: OrderStateMachine::new(store),
        }
    }

    pub fn store(&self) -> &S {
        self.machine.store()
    }
}

/// Counter recording what one application did.
fn applied_counter(applied: &Applied, event: &CanonicalEvent) -> &'static str {
    match (applied, event) {
        (Applied::Created(_), _) => "orders_created",
        (Applied::AlreadyAdvanced(_), _) => "orders_create_skipped",
        (Applied::Updated(_), CanonicalEvent::PaymentConfirmed(_)) => "payments_confirmed",
        (Applied::Updated(_), _) => "orders_updated",
    }
}

#[async_trait]
impl<S: OrderStore + 'static> EventHandler for OrderHandler<S> {
    fn name(&self) -> &'static str {
        "OrderHandler"
    }

    async fn handle(&self, event: &CanonicalEvent, _ctx: &BatchContext) -> Result<()> {
        let event_type = event.event_type().as_str();

        match self.machine.apply(event).await {
            Ok(applied) => {
                metrics::counter!(applied_counter(&applied, event)).increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("order_processing_errors", "event_type" => event_type)
                    .increment(1);
                tracing::warn!(
                    key = %event.idempotency_key(),
                    event_type,
                    recoverable = e.is_recoverable(),
                    error = %e,
                    "Failed to apply event"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandlerError;
    use chrono::{TimeZone, Utc};
    use common::{Currency, IdempotencyKey, Metadata};
    use domain::{OrderCreated, OrderError, PaymentConfirmed};
    use order_store::{InMemoryOrderStore, OrderId, OrderStatus};

    fn created(id: &str) -> CanonicalEvent {
        CanonicalEvent::from(OrderCreated {
            session_id: IdempotencyKey::new(id),
            payment_intent_id: Some(format!("pi_{id}")),
            customer_email: "a@b.com".to_string(),
            customer_id: Some("cus_1".to_string()),
            amount_total: 2500,
            currency: Currency::parse("usd").unwrap(),
            metadata: Metadata::new(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        })
    }

    fn confirmed(pi: &str) -> CanonicalEvent {
        CanonicalEvent::from(PaymentConfirmed {
            payment_intent_id: IdempotencyKey::new(pi),
            amount: 2500,
            currency: Currency::parse("usd").unwrap(),
            customer_id: "cus_1".to_string(),
            receipt_email: None,
            metadata: Metadata::new(),
            timestamp: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_applies_created_then_confirmed() {
        let handler = OrderHandler::new(InMemoryOrderStore::new());
        let ctx = BatchContext::default();

        handler.handle(&created("cs_1"), &ctx).await.unwrap();
        handler.handle(&confirmed("pi_cs_1"), &ctx).await.unwrap();

        let record = handler
            .store()
            .get(&OrderId::new("cs_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, OrderStatus::PaymentConfirmed);
    }

    #[tokio::test]
    async fn test_payment_without_order_fails_item() {
        let handler = OrderHandler::new(InMemoryOrderStore::new());
        let err = handler
            .handle(&confirmed("pi_missing"), &BatchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Order(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_redelivered_created_is_idempotent() {
        let handler = OrderHandler::new(InMemoryOrderStore::new());
        let ctx = BatchContext::default();

        handler.handle(&created("cs_1"), &ctx).await.unwrap();
        handler.handle(&created("cs_1"), &ctx).await.unwrap();

        assert_eq!(handler.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_skipped_create_counted_separately() {
        let store = InMemoryOrderStore::new();
        let machine = OrderStateMachine::new(store.clone());
        let ctx = BatchContext::default();
        let handler = OrderHandler::new(store);

        let created_event = created("cs_1");
        let first = machine.apply(&created_event).await.unwrap();
        assert_eq!(applied_counter(&first, &created_event), "orders_created");

        handler.handle(&confirmed("pi_cs_1"), &ctx).await.unwrap();
        let again = machine.apply(&created_event).await.unwrap();
        assert!(matches!(again, Applied::AlreadyAdvanced(_)));
        assert_eq!(applied_counter(&again, &created_event), "orders_create_skipped");
    }
}
