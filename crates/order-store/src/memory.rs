use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::{
    OrderKey, OrderPatch, OrderRecord, OrderStatus, PutOutcome, Result, StoreError,
    store::OrderStore,
};

/// In-memory order store implementation for testing.
///
/// Each conditional write holds the write lock for its whole check-and-set,
/// giving the same atomicity as a single SQL statement.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, OrderRecord>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Returns true if no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Returns every stored record.
    pub async fn all(&self) -> Vec<OrderRecord> {
        self.orders.read().await.values().cloned().collect()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
    }
}

fn find_key<'a>(
    orders: &'a mut HashMap<OrderId, OrderRecord>,
    key: &OrderKey,
) -> Option<&'a mut OrderRecord> {
    match key {
        OrderKey::OrderId(id) => orders.get_mut(id),
        OrderKey::PaymentIntent(pi) => orders
            .values_mut()
            .find(|r| r.payment_intent_id.as_deref() == Some(pi.as_str())),
    }
}

fn apply_checked(record: &mut OrderRecord, patch: &OrderPatch) -> Result<()> {
    if !patch.is_allowed_for(record) {
        return Err(StoreError::ConditionFailed {
            order_id: record.order_id.clone(),
            from: record.status,
            to: patch.status.unwrap_or(record.status),
        });
    }
    patch.apply_to(record);
    Ok(())
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: &OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn put(&self, record: OrderRecord) -> Result<PutOutcome> {
        let mut orders = self.orders.write().await;

        if let Some(existing) = orders.get(&record.order_id)
            && existing.status != OrderStatus::Created
        {
            return Ok(PutOutcome::Skipped);
        }

        orders.insert(record.order_id.clone(), record);
        Ok(PutOutcome::Written)
    }

    async fn update_if_exists(
        &self,
        key: &OrderKey,
        patch: &OrderPatch,
    ) -> Result<Option<OrderRecord>> {
        let mut orders = self.orders.write().await;

        let Some(record) = find_key(&mut orders, key) else {
            return Ok(None);
        };

        apply_checked(record, patch)?;
        Ok(Some(record.clone()))
    }

    async fn upsert(&self, seed: OrderRecord, patch: &OrderPatch) -> Result<OrderRecord> {
        let mut orders = self.orders.write().await;

        match orders.get_mut(&seed.order_id) {
            Some(record) => {
                apply_checked(record, patch)?;
                Ok(record.clone())
            }
            None => {
                orders.insert(seed.order_id.clone(), seed.clone());
                Ok(seed)
            }
        }
    }
}
