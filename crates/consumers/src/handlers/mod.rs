//! Handlers registered on the consumers.

mod notifications;
mod orders;

pub use notifications::{NotificationHandler, ORDER_CONFIRMATION, PAYMENT_CONFIRMATION};
pub use orders::OrderHandler;
