//! Durable order storage.
//!
//! The store is an external collaborator with get / put / update-if-exists
//! semantics. All writes are conditional so duplicate and out-of-order
//! deliveries converge without any locking in the callers.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::OrderId;
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use record::{OrderKey, OrderPatch, OrderRecord, OrderStatus, PutOutcome};
pub use store::{OrderStore, OrderStoreExt};
