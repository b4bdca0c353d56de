//! Applying canonical events to persisted orders.

mod state_machine;

pub use state_machine::{Applied, OrderStateMachine};

use order_store::{OrderKey, StoreError};
use thiserror::Error;

/// Errors that can occur while applying an event to an order.
#[derive(Debug, Error)]
pub enum OrderError {
    /// No record matches the event yet.
    ///
    /// Raised when a payment arrives before its order. Redelivery retries it
    /// once the order has landed.
    #[error("No order matches {0}")]
    NotFound(OrderKey),

    /// The store rejected or failed the write.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Returns true when a later redelivery may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            OrderError::NotFound(_) => true,
            OrderError::Store(StoreError::ConditionFailed { .. }) => false,
            OrderError::Store(StoreError::InvalidRecord(_)) => false,
            OrderError::Store(_) => true,
        }
    }
}
