//! Webhook ingress endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use fanout::{EventPublisher, SecretStore};
use serde::Serialize;

use crate::AppState;
use crate::error::WebhookError;

/// Primary signature header.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Accepted alias for the signature header.
pub const SIGNATURE_HEADER_ALIAS: &str = "signature";

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: &'static str,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// First non-blank signature header; a blank value counts as missing.
fn signature_header(headers: &HeaderMap) -> Option<&str> {
    [SIGNATURE_HEADER, SIGNATURE_HEADER_ALIAS]
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.trim().is_empty())
}

/// POST /webhooks/stripe
///
/// Verifies the signature over the raw body with the secrets fetched for this
/// request, normalizes the event and publishes it. Provider event types the
/// pipeline does not handle are acknowledged without publishing.
#[tracing::instrument(skip_all)]
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookError> {
    match process(&state, &headers, &body).await {
        Ok(response) => {
            let outcome = if response.message_id.is_some() {
                "published"
            } else {
                "ignored"
            };
            metrics::counter!("webhooks_received", "outcome" => outcome).increment(1);
            Ok(Json(response))
        }
        Err(e) => {
            metrics::counter!("webhooks_received", "outcome" => e.outcome()).increment(1);
            Err(e)
        }
    }
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookResponse, WebhookError> {
    let header = signature_header(headers).ok_or(WebhookError::MissingSignature)?;

    let bundle = state.secrets.fetch(&state.secrets_name).await?;
    let secrets = bundle.webhook_secrets()?;

    let accepted = state.ingress.accept(body, header, &secrets)?;

    let Some(event) = accepted.event else {
        return Ok(WebhookResponse {
            message: "Event type ignored",
            event_type: accepted.provider_event.event_type,
            message_id: None,
        });
    };

    let receipt = state.publisher.publish(&event).await?;
    tracing::info!(
        provider_event_id = %accepted.provider_event.id,
        event_type = %event.event_type(),
        message_id = %receipt.message_id,
        "Webhook published"
    );

    Ok(WebhookResponse {
        message: "Event processed",
        event_type: event.event_type().as_str().to_string(),
        message_id: Some(receipt.message_id.to_string()),
    })
}
