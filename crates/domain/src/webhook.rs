//! Verification and normalization of one inbound webhook.

use chrono::Utc;

use crate::error::DomainError;
use crate::event::CanonicalEvent;
use crate::normalizer::{EventNormalizer, ProviderEvent};
use crate::signature::SignatureVerifier;

/// A verified webhook.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub provider_event: ProviderEvent,
    /// `None` when the provider type is not one this pipeline handles.
    pub event: Option<CanonicalEvent>,
}

/// Runs the signature check before anything looks at the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookIngress {
    verifier: SignatureVerifier,
    normalizer: EventNormalizer,
}

impl WebhookIngress {
    pub fn new(verifier: SignatureVerifier) -> Self {
        Self {
            verifier,
            normalizer: EventNormalizer::new(),
        }
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Verifies against every active secret, then parses and normalizes.
    pub fn accept(
        &self,
        body: &[u8],
        signature_header: &str,
        secrets: &[&[u8]],
    ) -> Result<Accepted, DomainError> {
        self.accept_at(body, signature_header, secrets, Utc::now().timestamp())
    }

    #[tracing::instrument(skip_all)]
    pub fn accept_at(
        &self,
        body: &[u8],
        signature_header: &str,
        secrets: &[&[u8]],
        now: i64,
    ) -> Result<Accepted, DomainError> {
        self.verifier
            .check_any_at(body, signature_header, secrets, now)?;

        let provider_event = ProviderEvent::parse(body)?;
        tracing::info!(
            provider_event_id = %provider_event.id,
            provider_event_type = %provider_event.event_type,
            test_mode = provider_event.is_test_event(),
            "Webhook verified"
        );

        let event = self.normalizer.normalize_event(&provider_event)?;
        Ok(Accepted {
            provider_event,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::signature_header;

    const SECRET: &[u8] = b"whsec_test";
    const NOW: i64 = 1_700_000_000;

    fn body(kind: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": kind,
            "created": NOW,
            "livemode": false,
            "data": {"object": object}
        }))
        .unwrap()
    }

    #[test]
    fn test_accepts_checkout_session() {
        let body = body(
            "checkout.session.completed",
            serde_json::json!({
                "id": "cs_1",
                "payment_intent": "pi_1",
                "amount_total": 2500,
                "currency": "usd",
                "customer_details": {"email": "a@b.com"}
            }),
        );
        let header = signature_header(SECRET, NOW, &body).unwrap();

        let accepted = WebhookIngress::default()
            .accept_at(&body, &header, &[SECRET], NOW)
            .unwrap();

        let event = accepted.event.unwrap();
        assert_eq!(event.idempotency_key().as_str(), "cs_1");
        assert_eq!(event.occurred_at().timestamp(), NOW);
    }

    #[test]
    fn test_signature_checked_before_parsing() {
        let header = signature_header(SECRET, NOW, b"not json").unwrap();
        let err = WebhookIngress::default()
            .accept_at(b"not json", &header, &[b"whsec_other".as_slice()], NOW)
            .unwrap_err();
        assert!(matches!(err, DomainError::Signature(_)));

        let err = WebhookIngress::default()
            .accept_at(b"not json", &header, &[SECRET], NOW)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidBody(_)));
    }

    #[test]
    fn test_unhandled_type_is_accepted_without_event() {
        let body = body("customer.created", serde_json::json!({"id": "cus_1"}));
        let header = signature_header(SECRET, NOW, &body).unwrap();

        let accepted = WebhookIngress::default()
            .accept_at(&body, &header, &[SECRET], NOW)
            .unwrap();

        assert!(accepted.event.is_none());
        assert_eq!(accepted.provider_event.event_type, "customer.created");
    }
}
