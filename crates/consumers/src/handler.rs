//! Event handler trait.

use async_trait::async_trait;
use domain::CanonicalEvent;
use fanout::SecretBundle;

use crate::Result;

/// Per-batch state shared by every item in the batch.
#[derive(Debug, Clone, Default)]
pub struct BatchContext {
    /// Fetched once before dispatch when the consumer is configured with a
    /// secret name.
    pub secrets: Option<SecretBundle>,
}

/// Handles one canonical event type for a consumer.
///
/// Delivery is at-least-once: invoking a handler twice with the same event
/// must leave the same end state as invoking it once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler.
    fn name(&self) -> &'static str;

    /// Handles a single event.
    async fn handle(&self, event: &CanonicalEvent, ctx: &BatchContext) -> Result<()>;
}
