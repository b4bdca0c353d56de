//! Domain layer for the payment webhook pipeline.
//!
//! This crate provides:
//! - Webhook signature verification with key rotation
//! - Normalization of provider events into canonical events
//! - Queued envelope decoding (direct or relay-wrapped)
//! - The order state machine applied by the orders consumer

pub mod envelope;
pub mod error;
pub mod event;
pub mod normalizer;
pub mod order;
pub mod signature;
pub mod webhook;

pub use envelope::{
    Delivery, EnvelopeError, InboundEvent, QueuedEnvelope, RelayAttribute, RelayEnvelope,
};
pub use error::DomainError;
pub use event::{CanonicalEvent, EventType, OrderCreated, OrderUpdated, PaymentConfirmed};
pub use normalizer::{EventNormalizer, NormalizeError, ProviderEvent};
pub use order::{Applied, OrderError, OrderStateMachine};
pub use signature::{
    DEFAULT_TOLERANCE_SECS, SignatureError, SignatureHeader, SignatureVerifier, sign_payload,
    signature_header,
};
pub use webhook::{Accepted, WebhookIngress};
