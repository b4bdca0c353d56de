//! Conversion of provider payloads into canonical events.
//!
//! Provider objects are deserialized into small typed structs with every
//! field optional, then validated here so that a missing identifier and a
//! missing required field produce distinct errors.

use chrono::{DateTime, Utc};
use common::{Currency, IdempotencyKey, Metadata};
use serde::Deserialize;
use thiserror::Error;

use crate::event::{CanonicalEvent, OrderCreated, OrderUpdated, PaymentConfirmed};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";

/// Errors raised while turning a provider payload into a canonical event.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The field that becomes the idempotency key is absent.
    #[error("{provider_event_type} is missing identifier field {field}")]
    MissingIdentifier {
        provider_event_type: String,
        field: &'static str,
    },

    /// Another required field is absent.
    #[error("{provider_event_type} is missing required field {field}")]
    MissingField {
        provider_event_type: String,
        field: &'static str,
    },

    /// The payload does not have the expected shape.
    #[error("Invalid provider payload: {0}")]
    InvalidPayload(String),
}

/// The provider's outer event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    pub data: ProviderEventData,
    #[serde(default)]
    pub livemode: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEventData {
    pub object: serde_json::Value,
}

impl ProviderEvent {
    /// Parses a raw webhook body, requiring `id`, `type`, `created` and `data.object`.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Test-mode events carry `livemode: false`. An absent flag counts as live.
    pub fn is_test_event(&self) -> bool {
        self.livemode == Some(false)
    }

    pub fn occurred_at(&self) -> Result<DateTime<Utc>, NormalizeError> {
        DateTime::from_timestamp(self.created, 0).ok_or_else(|| {
            NormalizeError::InvalidPayload(format!("created {} is out of range", self.created))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: Option<String>,
    payment_intent: Option<String>,
    customer: Option<String>,
    customer_details: Option<CustomerDetails>,
    amount_total: Option<i64>,
    currency: Option<String>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
    customer: Option<String>,
    receipt_email: Option<String>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Invoice {
    id: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    amount_paid: Option<i64>,
    currency: Option<String>,
    metadata: Option<Metadata>,
}

/// Maps the three supported provider event types to canonical events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventNormalizer;

impl EventNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes a parsed provider event.
    pub fn normalize_event(
        &self,
        event: &ProviderEvent,
    ) -> Result<Option<CanonicalEvent>, NormalizeError> {
        self.normalize(&event.event_type, &event.data.object, event.occurred_at()?)
    }

    /// Returns `Ok(None)` for provider types this pipeline does not handle.
    pub fn normalize(
        &self,
        provider_event_type: &str,
        data_object: &serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<CanonicalEvent>, NormalizeError> {
        let event: CanonicalEvent = match provider_event_type {
            CHECKOUT_SESSION_COMPLETED => {
                let session: CheckoutSession = decode(data_object)?;
                checkout_completed(provider_event_type, session, occurred_at)?.into()
            }
            PAYMENT_INTENT_SUCCEEDED => {
                let intent: PaymentIntent = decode(data_object)?;
                payment_succeeded(provider_event_type, intent, occurred_at)?.into()
            }
            INVOICE_PAYMENT_SUCCEEDED => {
                let invoice: Invoice = decode(data_object)?;
                invoice_paid(provider_event_type, invoice, occurred_at)?.into()
            }
            other => {
                tracing::debug!(provider_event_type = other, "Ignoring unhandled provider event");
                return Ok(None);
            }
        };

        Ok(Some(event))
    }
}

fn decode<T: serde::de::DeserializeOwned>(object: &serde_json::Value) -> Result<T, NormalizeError> {
    T::deserialize(object).map_err(|e| NormalizeError::InvalidPayload(e.to_string()))
}

fn identifier(
    kind: &str,
    value: Option<String>,
    field: &'static str,
) -> Result<IdempotencyKey, NormalizeError> {
    value
        .filter(|v| !v.is_empty())
        .map(IdempotencyKey::new)
        .ok_or_else(|| NormalizeError::MissingIdentifier {
            provider_event_type: kind.to_string(),
            field,
        })
}

fn required<T>(kind: &str, value: Option<T>, field: &'static str) -> Result<T, NormalizeError> {
    value.ok_or_else(|| NormalizeError::MissingField {
        provider_event_type: kind.to_string(),
        field,
    })
}

fn currency(code: String) -> Result<Currency, NormalizeError> {
    Currency::parse(&code).map_err(|e| NormalizeError::InvalidPayload(e.to_string()))
}

fn checkout_completed(
    kind: &str,
    session: CheckoutSession,
    timestamp: DateTime<Utc>,
) -> Result<OrderCreated, NormalizeError> {
    let session_id = identifier(kind, session.id, "id")?;
    let customer_email = session.customer_details.unwrap_or_default().email;

    Ok(OrderCreated {
        session_id,
        payment_intent_id: session.payment_intent,
        customer_email: required(kind, customer_email, "customer_details.email")?,
        customer_id: session.customer,
        amount_total: required(kind, session.amount_total, "amount_total")?,
        currency: currency(required(kind, session.currency, "currency")?)?,
        metadata: session.metadata.unwrap_or_default(),
        timestamp,
    })
}

fn payment_succeeded(
    kind: &str,
    intent: PaymentIntent,
    timestamp: DateTime<Utc>,
) -> Result<PaymentConfirmed, NormalizeError> {
    let payment_intent_id = identifier(kind, intent.id, "id")?;

    Ok(PaymentConfirmed {
        payment_intent_id,
        amount: required(kind, intent.amount, "amount")?,
        currency: currency(required(kind, intent.currency, "currency")?)?,
        customer_id: required(kind, intent.customer, "customer")?,
        receipt_email: intent.receipt_email,
        metadata: intent.metadata.unwrap_or_default(),
        timestamp,
    })
}

fn invoice_paid(
    kind: &str,
    invoice: Invoice,
    timestamp: DateTime<Utc>,
) -> Result<OrderUpdated, NormalizeError> {
    let invoice_id = identifier(kind, invoice.id, "id")?;

    Ok(OrderUpdated {
        invoice_id,
        customer_id: invoice.customer,
        subscription_id: invoice.subscription,
        amount_paid: invoice.amount_paid,
        currency: invoice.currency.map(currency).transpose()?,
        metadata: invoice.metadata.unwrap_or_default(),
        timestamp,
    })
}
