//! Queued message envelopes and their decoding.
//!
//! A queue receives the canonical event either directly (raw delivery) or
//! wrapped once by a pub/sub relay. Decoding resolves that difference in one
//! step and then classifies the body by its `event_type`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::MessageId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{CanonicalEvent, EventType};

/// Errors raised while decoding a queued envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The body is not JSON.
    #[error("Envelope body is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The body was flagged as relay-wrapped but is not a relay notification.
    #[error("Invalid relay envelope: {0}")]
    InvalidRelay(#[source] serde_json::Error),

    /// The body has no `event_type` at all.
    #[error("Envelope body has no event_type")]
    MissingEventType,

    /// The event type is known but the body does not match it.
    #[error("Invalid {event_type} body: {source}")]
    InvalidEvent {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },
}

/// One message attribute as a relay serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayAttribute {
    #[serde(rename = "Type")]
    pub data_type: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl RelayAttribute {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            value: value.into(),
        }
    }
}

/// The notification document a pub/sub relay puts on a queue.
///
/// Only `Message` matters to consumers; everything else is relay metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelayEnvelope {
    #[serde(rename = "Type", default = "notification")]
    pub kind: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub topic_arn: String,
    pub message: String,
    #[serde(default)]
    pub message_attributes: HashMap<String, RelayAttribute>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn notification() -> String {
    "Notification".to_string()
}

impl RelayEnvelope {
    /// Wraps a message body the way the relay does.
    pub fn wrap(
        message_id: impl Into<String>,
        topic_arn: impl Into<String>,
        message: impl Into<String>,
        attributes: &HashMap<String, String>,
    ) -> Self {
        Self {
            kind: notification(),
            message_id: message_id.into(),
            topic_arn: topic_arn.into(),
            message: message.into(),
            message_attributes: attributes
                .iter()
                .map(|(k, v)| (k.clone(), RelayAttribute::string(v)))
                .collect(),
            timestamp: Utc::now(),
        }
    }

    /// Returns a message attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.message_attributes.get(name).map(|a| a.value.as_str())
    }
}

/// How a queued body reached the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Direct(serde_json::Value),
    Relayed(RelayEnvelope),
}

impl Delivery {
    /// Unwraps at most one relay level and returns the canonical body.
    pub fn into_body(self) -> Result<serde_json::Value, EnvelopeError> {
        match self {
            Delivery::Direct(body) => Ok(body),
            Delivery::Relayed(relay) => {
                serde_json::from_str(&relay.message).map_err(EnvelopeError::InvalidJson)
            }
        }
    }
}

/// The result of decoding a queued body.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Known(CanonicalEvent),
    /// A well-formed body with an `event_type` this build does not know.
    Unrecognized { event_type: String },
}

impl InboundEvent {
    /// Classifies a canonical body by its `event_type`.
    pub fn from_body(body: serde_json::Value) -> Result<Self, EnvelopeError> {
        let Some(name) = body.get("event_type").and_then(|t| t.as_str()) else {
            return Err(EnvelopeError::MissingEventType);
        };

        let Some(event_type) = EventType::parse(name) else {
            return Ok(InboundEvent::Unrecognized {
                event_type: name.to_string(),
            });
        };

        serde_json::from_value(body)
            .map(InboundEvent::Known)
            .map_err(|source| EnvelopeError::InvalidEvent { event_type, source })
    }

    pub fn event_type_name(&self) -> &str {
        match self {
            InboundEvent::Known(event) => event.event_type().as_str(),
            InboundEvent::Unrecognized { event_type } => event_type,
        }
    }
}

/// A unit of at-least-once work taken from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEnvelope {
    pub message_id: MessageId,
    pub body: Vec<u8>,
    pub relay_wrapped: bool,
}

impl QueuedEnvelope {
    /// An envelope carrying the canonical body directly.
    pub fn direct(message_id: impl Into<MessageId>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            relay_wrapped: false,
        }
    }

    /// An envelope carrying a relay notification.
    pub fn relayed(message_id: impl Into<MessageId>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            relay_wrapped: true,
        }
    }

    pub fn delivery(&self) -> Result<Delivery, EnvelopeError> {
        if self.relay_wrapped {
            serde_json::from_slice(&self.body)
                .map(Delivery::Relayed)
                .map_err(EnvelopeError::InvalidRelay)
        } else {
            serde_json::from_slice(&self.body)
                .map(Delivery::Direct)
                .map_err(EnvelopeError::InvalidJson)
        }
    }

    /// Unwraps and classifies the body.
    pub fn decode(&self) -> Result<InboundEvent, EnvelopeError> {
        InboundEvent::from_body(self.delivery()?.into_body()?)
    }
}
