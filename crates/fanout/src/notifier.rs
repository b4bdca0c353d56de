//! Black-box notification collaborator.
//!
//! Rendering and delivery are out of scope: a notifier receives a template
//! key, a recipient and a flat string context.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::NotifyError;

/// One message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub template: String,
    pub recipient: String,
    pub from: String,
    pub context: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(
        template: impl Into<String>,
        recipient: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            template: template.into(),
            recipient: recipient.into(),
            from: from.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        (**self).send(notification).await
    }
}

/// Notifier that only logs. Used by the binary when no mail transport exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            template = %notification.template,
            recipient = %notification.recipient,
            from = %notification.from,
            "Notification sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Notification>,
    rejected_recipients: HashSet<String>,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
    fail_on_send: Arc<AtomicBool>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.fail_on_send.store(fail, Ordering::SeqCst);
    }

    /// Rejects sends to one recipient.
    pub async fn reject_recipient(&self, recipient: impl Into<String>) {
        self.state
            .lock()
            .await
            .rejected_recipients
            .insert(recipient.into());
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.fail_on_send.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("mail transport unavailable".to_string()));
        }

        let mut state = self.state.lock().await;
        if state.rejected_recipients.contains(&notification.recipient) {
            return Err(NotifyError::Rejected(notification.recipient));
        }
        state.sent.push(notification);
        Ok(())
    }
}
