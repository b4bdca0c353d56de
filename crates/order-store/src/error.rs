use common::OrderId;
use thiserror::Error;

use crate::OrderStatus;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write was rejected because the stored status cannot
    /// move to the requested one.
    #[error("Condition failed for order {order_id}: cannot move from {from} to {to}")]
    ConditionFailed {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The record disappeared between the insert and update halves of an upsert.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// A stored row could not be mapped back into an order record.
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
