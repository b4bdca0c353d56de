use async_trait::async_trait;
use common::format_amount;
use domain::CanonicalEvent;
use fanout::{FROM_EMAIL_KEY, Notification, Notifier, SecretsError};

use crate::handler::{BatchContext, EventHandler};
use crate::{HandlerError, Result};

/// Template key for a created order.
pub const ORDER_CONFIRMATION: &str = "order_confirmation";

/// Template key for a confirmed payment.
pub const PAYMENT_CONFIRMATION: &str = "payment_confirmation";

/// Chooses a template, recipient and context for the notifier.
///
/// The sender address is read from the batch secrets. Payment confirmations
/// without a receipt email are skipped successfully.
pub struct NotificationHandler<N: Notifier> {
    notifier: N,
}

impl<N: Notifier> NotificationHandler<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    fn from_address<'a>(&self, ctx: &'a BatchContext) -> Result<&'a str> {
        let secrets = ctx
            .secrets
            .as_ref()
            .ok_or_else(|| SecretsError::NotFound("notification secrets".to_string()))?;
        Ok(secrets.require(FROM_EMAIL_KEY)?)
    }

    /// Builds the notification for an event, or `None` when there is nobody
    /// to send it to.
    pub fn compose(&self, event: &CanonicalEvent, from: &str) -> Option<Notification> {
        match event {
            CanonicalEvent::OrderCreated(e) => Some(
                Notification::new(ORDER_CONFIRMATION, &e.customer_email, from)
                    .with("order_id", e.session_id.as_str())
                    .with("amount", format_amount(e.amount_total, e.currency.as_str())),
            ),
            CanonicalEvent::PaymentConfirmed(e) => {
                let recipient = e.receipt_email.as_deref()?;
                Some(
                    Notification::new(PAYMENT_CONFIRMATION, recipient, from)
                        .with("payment_intent_id", e.payment_intent_id.as_str())
                        .with("amount", format_amount(e.amount, e.currency.as_str())),
                )
            }
            CanonicalEvent::OrderUpdated(_) => None,
        }
    }
}

#[async_trait]
impl<N: Notifier + 'static> EventHandler for NotificationHandler<N> {
    fn name(&self) -> &'static str {
        "NotificationHandler"
    }

    async fn handle(&self, event: &CanonicalEvent, ctx: &BatchContext) -> Result<()> {
        let from = self.from_address(ctx)?;

        let Some(notification) = self.compose(event, from) else {
            tracing::info!(
                key = %event.idempotency_key(),
                event_type = %event.event_type(),
                "No recipient, skipping notification"
            );
            return Ok(());
        };

        let template = notification.template.clone();
        match self.notifier.send(notification).await {
            Ok(()) => {
                metrics::counter!("emails_sent", "template" => template).increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("email_send_failures", "template" => template).increment(1);
                Err(HandlerError::Notify(e))
            }
        }
    }
}
