//! Batch consumers for the payment event queues.
//!
//! A `BatchConsumer` decodes each queued envelope, dispatches it to the
//! handler registered for its event type, and reports exactly the items that
//! failed so the transport redelivers only those.

pub mod consumer;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod report;

pub use consumer::{BatchConsumer, DEFAULT_ITEM_TIMEOUT, ItemOutcome};
pub use error::{HandlerError, Result};
pub use handler::{BatchContext, EventHandler};
pub use handlers::{NotificationHandler, OrderHandler, ORDER_CONFIRMATION, PAYMENT_CONFIRMATION};
pub use report::{BatchItemFailure, BatchReport};

/// Name of the consumer driving the order state machine.
pub const ORDERS_CONSUMER: &str = "orders";

/// Name of the consumer sending notifications.
pub const NOTIFICATIONS_CONSUMER: &str = "notifications";
