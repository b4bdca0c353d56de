//! Shared identifiers and money helpers used across the webhook pipeline.

pub mod money;
pub mod types;

pub use money::{Currency, InvalidCurrency, format_amount};
pub use types::{IdempotencyKey, MessageId, Metadata, OrderId};
