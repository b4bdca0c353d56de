use order_store::{
    OrderId, OrderKey, OrderPatch, OrderRecord, OrderStatus, OrderStore, PutOutcome,
};
use rust_decimal::Decimal;

use super::OrderError;
use crate::event::{CanonicalEvent, OrderCreated, OrderUpdated, PaymentConfirmed};

/// What applying one event did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The order record was written.
    Created(OrderRecord),
    /// The record already advanced past `Created`; nothing was written.
    AlreadyAdvanced(OrderId),
    /// An existing record was updated (or inserted, for invoices).
    Updated(OrderRecord),
}

/// Applies canonical events to persisted order records.
///
/// Every operation is a single conditional store write, so applying the
/// same event twice, or two events concurrently, converges on one state.
/// Record timestamps come from the event, never from the local clock.
pub struct OrderStateMachine<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderStateMachine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Dispatches on the event variant.
    pub async fn apply(&self, event: &CanonicalEvent) -> Result<Applied, OrderError> {
        match event {
            CanonicalEvent::OrderCreated(e) => self.apply_order_created(e).await,
            CanonicalEvent::PaymentConfirmed(e) => self.apply_payment_confirmed(e).await,
            CanonicalEvent::OrderUpdated(e) => self.apply_order_updated(e).await,
        }
    }

    /// Writes the order keyed by the checkout session id.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.session_id))]
    pub async fn apply_order_created(&self, event: &OrderCreated) -> Result<Applied, OrderError> {
        let mut record = OrderRecord::new(
            OrderId::from(&event.session_id),
            Decimal::from(event.amount_total),
            event.timestamp,
        );
        record.customer_id = event.customer_id.clone();
        record.customer_email = Some(event.customer_email.clone());
        record.currency = Some(event.currency.clone());
        record.payment_intent_id = event.payment_intent_id.clone();
        record.metadata = event.metadata.clone();

        match self.store.put(record.clone()).await? {
            PutOutcome::Written => {
                tracing::info!("Order created");
                Ok(Applied::Created(record))
            }
            PutOutcome::Skipped => {
                tracing::info!("Order already advanced, keeping stored status");
                Ok(Applied::AlreadyAdvanced(record.order_id))
            }
        }
    }

    /// Confirms payment on the order carrying this payment intent.
    ///
    /// Update-only: when the order has not landed yet this fails with
    /// `OrderError::NotFound` and the transport redelivers.
    #[tracing::instrument(skip(self, event), fields(payment_intent_id = %event.payment_intent_id))]
    pub async fn apply_payment_confirmed(
        &self,
        event: &PaymentConfirmed,
    ) -> Result<Applied, OrderError> {
        let key = OrderKey::PaymentIntent(event.payment_intent_id.as_str().to_string());
        let patch = OrderPatch::touch(event.timestamp)
            .status(OrderStatus::PaymentConfirmed)
            .payment_confirmed_at(event.timestamp);

        match self.store.update_if_exists(&key, &patch).await? {
            Some(record) => {
                tracing::info!(order_id = %record.order_id, "Payment confirmed");
                Ok(Applied::Updated(record))
            }
            None => {
                tracing::warn!("No order for payment intent yet");
                Err(OrderError::NotFound(key))
            }
        }
    }

    /// Records a paid invoice under its own id.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.invoice_id))]
    pub async fn apply_order_updated(&self, event: &OrderUpdated) -> Result<Applied, OrderError> {
        let amount_paid = event.amount_paid.map(Decimal::from);

        let mut seed = OrderRecord::new(
            OrderId::from(&event.invoice_id),
            amount_paid.unwrap_or(Decimal::ZERO),
            event.timestamp,
        );
        seed.status = OrderStatus::Updated;
        seed.customer_id = event.customer_id.clone();
        seed.currency = event.currency.clone();
        seed.subscription_id = event.subscription_id.clone();
        seed.amount_paid = amount_paid;
        seed.metadata = event.metadata.clone();

        let patch = OrderPatch::touch(event.timestamp)
            .status(OrderStatus::Updated)
            .subscription_id(event.subscription_id.clone())
            .amount_paid(amount_paid);

        let record = self.store.upsert(seed, &patch).await?;
        tracing::info!("Order updated");
        Ok(Applied::Updated(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use common::{Currency, IdempotencyKey, Metadata};
    use order_store::{InMemoryOrderStore, StoreError};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn order_created() -> OrderCreated {
        OrderCreated {
            session_id: IdempotencyKey::new("cs_1"),
            payment_intent_id: Some("pi_1".to_string()),
            customer_email: "a@b.com".to_string(),
            customer_id: None,
            amount_total: 2500,
            currency: Currency::parse("usd").unwrap(),
            metadata: Metadata::new(),
            timestamp: at(1_000),
        }
    }

    fn payment_confirmed() -> PaymentConfirmed {
        PaymentConfirmed {
            payment_intent_id: IdempotencyKey::new("pi_1"),
            amount: 2500,
            currency: Currency::parse("usd").unwrap(),
            customer_id: "cus_1".to_string(),
            receipt_email: None,
            metadata: Metadata::new(),
            timestamp: at(2_000),
        }
    }

    fn order_updated(subscription: Option<&str>, amount_paid: Option<i64>, ts: i64) -> OrderUpdated {
        OrderUpdated {
            invoice_id: IdempotencyKey::new("in_1"),
            customer_id: Some("cus_1".to_string()),
            subscription_id: subscription.map(String::from),
            amount_paid,
            currency: None,
            metadata: Metadata::new(),
            timestamp: at(ts),
        }
    }

    #[tokio::test]
    async fn test_order_created_is_idempotent() {
        let store = InMemoryOrderStore::new();
        let machine = OrderStateMachine::new(store.clone());

        machine.apply_order_created(&order_created()).await.unwrap();
        let first = store.get(&OrderId::new("cs_1")).await.unwrap().unwrap();

        machine.apply_order_created(&order_created()).await.unwrap();
        let second = store.get(&OrderId::new("cs_1")).await.unwrap().unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(first, second);
        assert_eq!(first.status, OrderStatus::Created);
        assert_eq!(first.amount_total, Decimal::from(2500));
        assert_eq!(first.created_at, at(1_000));
    }

    #[tokio::test]
    async fn test_payment_confirmed_after_order() {
        let store = InMemoryOrderStore::new();
        let machine = OrderStateMachine::new(store.clone());
        machine.apply_order_created(&order_created()).await.unwrap();

        let applied = machine
            .apply_payment_confirmed(&payment_confirmed())
            .await
            .unwrap();

        let Applied::Updated(record) = applied else {
            panic!("expected Updated");
        };
        assert_eq!(record.order_id, OrderId::new("cs_1"));
        assert_eq!(record.status, OrderStatus::PaymentConfirmed);
        assert_eq!(record.payment_confirmed_at, Some(at(2_000)));
        assert_eq!(record.updated_at, at(2_000));

        // Duplicate delivery is a no-op.
        let again = machine.apply(&payment_confirmed().into()).await.unwrap();
        assert_eq!(again, Applied::Updated(record));
    }

    #[tokio::test]
    async fn test_payment_before_order_is_recoverable_not_found() {
        let store = InMemoryOrderStore::new();
        let machine = OrderStateMachine::new(store.clone());

        let err = machine
            .apply_payment_confirmed(&payment_confirmed())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound(OrderKey::PaymentIntent(ref pi)) if pi == "pi_1"));
        assert!(err.is_recoverable());
        assert!(store.is_empty().await);

        // Once the order lands, the redelivered payment applies.
        machine.apply_order_created(&order_created()).await.unwrap();
        machine
            .apply_payment_confirmed(&payment_confirmed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_late_order_created_does_not_regress() {
        let store = InMemoryOrderStore::new();
        let machine = OrderStateMachine::new(store.clone());
        machine.apply_order_created(&order_created()).await.unwrap();
        machine
            .apply_payment_confirmed(&payment_confirmed())
            .await
            .unwrap();

        let applied = machine.apply_order_created(&order_created()).await.unwrap();
        assert_eq!(applied, Applied::AlreadyAdvanced(OrderId::new("cs_1")));

        let record = store.get(&OrderId::new("cs_1")).await.unwrap().unwrap();
        assert_eq!(record.status, OrderStatus::PaymentConfirmed);
    }

    #[tokio::test]
    async fn test_order_updated_inserts_then_patches_present_fields() {
        let store = InMemoryOrderStore::new();
        let machine = OrderStateMachine::new(store.clone());

        machine
            .apply_order_updated(&order_updated(Some("sub_1"), None, 3_000))
            .await
            .unwrap();
        machine
            .apply_order_updated(&order_updated(None, Some(4200), 4_000))
            .await
            .unwrap();

        let record = store.get(&OrderId::new("in_1")).await.unwrap().unwrap();
        assert_eq!(record.status, OrderStatus::Updated);
        assert_eq!(record.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(record.amount_paid, Some(Decimal::from(4200)));
        assert_eq!(record.updated_at, at(4_000));
    }

    #[tokio::test]
    async fn test_payment_on_updated_record_is_condition_failure() {
        let store = InMemoryOrderStore::new();
        let machine = OrderStateMachine::new(store.clone());

        let mut record = OrderRecord::new(OrderId::new("in_9"), Decimal::ZERO, at(1));
        record.status = OrderStatus::Updated;
        record.payment_intent_id = Some("pi_1".to_string());
        store
            .upsert(record, &OrderPatch::touch(at(1)))
            .await
            .unwrap();

        let err = machine
            .apply_payment_confirmed(&payment_confirmed())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Store(StoreError::ConditionFailed { .. })
        ));
        assert!(!err.is_recoverable());
    }
}
