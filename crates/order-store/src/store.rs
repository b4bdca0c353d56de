use async_trait::async_trait;
use common::OrderId;

use crate::{OrderKey, OrderPatch, OrderRecord, PutOutcome, Result};

/// Core trait for durable order storage.
///
/// Every write is conditional and executed atomically by the implementation.
/// Callers never read a record, modify it and write it back: concurrent or
/// duplicate deliveries of the same event must converge on one state.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Retrieves a record by partition key.
    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderRecord>>;

    /// Inserts a record, or overwrites an existing one that is still `Created`.
    ///
    /// A record that has already advanced is left untouched and
    /// `PutOutcome::Skipped` is returned.
    async fn put(&self, record: OrderRecord) -> Result<PutOutcome>;

    /// Applies `patch` to the record matching `key`, if there is one.
    ///
    /// Returns the updated record, or `None` when no record matches. Fails
    /// with `ConditionFailed` when the patch would move the status against
    /// the transition table.
    async fn update_if_exists(&self, key: &OrderKey, patch: &OrderPatch)
    -> Result<Option<OrderRecord>>;

    /// Inserts `seed` when no record exists under its order id, otherwise
    /// applies `patch` to the existing record.
    async fn upsert(&self, seed: OrderRecord, patch: &OrderPatch) -> Result<OrderRecord>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for std::sync::Arc<T> {
    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderRecord>> {
        (**self).get(order_id).await
    }

    async fn put(&self, record: OrderRecord) -> Result<PutOutcome> {
        (**self).put(record).await
    }

    async fn update_if_exists(
        &self,
        key: &OrderKey,
        patch: &OrderPatch,
    ) -> Result<Option<OrderRecord>> {
        (**self).update_if_exists(key, patch).await
    }

    async fn upsert(&self, seed: OrderRecord, patch: &OrderPatch) -> Result<OrderRecord> {
        (**self).upsert(seed, patch).await
    }
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Checks if a record exists.
    async fn exists(&self, order_id: &OrderId) -> Result<bool> {
        Ok(self.get(order_id).await?.is_some())
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
