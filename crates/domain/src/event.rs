//! Canonical events published on the fan-out channel.

use chrono::{DateTime, Utc};
use common::{Currency, IdempotencyKey, Metadata};
use serde::{Deserialize, Serialize};

/// Routing value of the `event_type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OrderCreated,
    PaymentConfirmed,
    OrderUpdated,
}

impl EventType {
    pub const ALL: [EventType; 3] = [
        EventType::OrderCreated,
        EventType::PaymentConfirmed,
        EventType::OrderUpdated,
    ];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "order_created",
            EventType::PaymentConfirmed => "payment_confirmed",
            EventType::OrderUpdated => "order_updated",
        }
    }

    /// Parses a wire name. Unknown names are `None`.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A checkout session completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub session_id: IdempotencyKey,
    pub payment_intent_id: Option<String>,
    pub customer_email: String,
    pub customer_id: Option<String>,
    /// Minor units.
    pub amount_total: i64,
    pub currency: Currency,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// A payment intent succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    pub payment_intent_id: IdempotencyKey,
    /// Minor units.
    pub amount: i64,
    pub currency: Currency,
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_email: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// A subscription invoice was paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdated {
    pub invoice_id: IdempotencyKey,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Minor units.
    pub amount_paid: Option<i64>,
    pub currency: Option<Currency>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// The internal representation of a provider notification.
///
/// Serialized flat with an `event_type` tag, e.g.
/// `{"event_type":"order_created","session_id":"cs_1",...,"timestamp":1700000000}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CanonicalEvent {
    OrderCreated(OrderCreated),
    PaymentConfirmed(PaymentConfirmed),
    OrderUpdated(OrderUpdated),
}

impl CanonicalEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            CanonicalEvent::OrderCreated(_) => EventType::OrderCreated,
            CanonicalEvent::PaymentConfirmed(_) => EventType::PaymentConfirmed,
            CanonicalEvent::OrderUpdated(_) => EventType::OrderUpdated,
        }
    }

    /// The provider identifier downstream consumers deduplicate on.
    pub fn idempotency_key(&self) -> &IdempotencyKey {
        match self {
            CanonicalEvent::OrderCreated(e) => &e.session_id,
            CanonicalEvent::PaymentConfirmed(e) => &e.payment_intent_id,
            CanonicalEvent::OrderUpdated(e) => &e.invoice_id,
        }
    }

    /// When the provider says the event happened.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CanonicalEvent::OrderCreated(e) => e.timestamp,
            CanonicalEvent::PaymentConfirmed(e) => e.timestamp,
            CanonicalEvent::OrderUpdated(e) => e.timestamp,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            CanonicalEvent::OrderCreated(e) => &e.metadata,
            CanonicalEvent::PaymentConfirmed(e) => &e.metadata,
            CanonicalEvent::OrderUpdated(e) => &e.metadata,
        }
    }

    /// Serializes the event as a message body.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<OrderCreated> for CanonicalEvent {
    fn from(e: OrderCreated) -> Self {
        CanonicalEvent::OrderCreated(e)
    }
}

impl From<PaymentConfirmed> for CanonicalEvent {
    fn from(e: PaymentConfirmed) -> Self {
        CanonicalEvent::PaymentConfirmed(e)
    }
}

impl From<OrderUpdated> for CanonicalEvent {
    fn from(e: OrderUpdated) -> Self {
        CanonicalEvent::OrderUpdated(e)
    }
}
