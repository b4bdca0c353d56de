//! Secrets collaborator.
//!
//! Secrets are fetched by name on every invocation and never cached, so a
//! rotated webhook secret takes effect on the next request.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::SecretsError;

/// Current webhook signing secret.
pub const WEBHOOK_SECRET_KEY: &str = "stripe_webhook_secret";

/// Previous webhook signing secret, accepted during rotation.
pub const PREVIOUS_WEBHOOK_SECRET_KEY: &str = "stripe_webhook_secret_previous";

/// Sender address for outgoing notifications.
pub const FROM_EMAIL_KEY: &str = "notification_from_email";

/// A fetched key-value secret bundle.
#[derive(Debug, Clone, Default)]
pub struct SecretBundle {
    name: String,
    values: HashMap<String, String>,
}

impl SecretBundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    /// Adds a key, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &'static str) -> Result<&str, SecretsError> {
        self.get(key).ok_or_else(|| SecretsError::MissingKey {
            name: self.name.clone(),
            key,
        })
    }

    /// Active webhook secrets, current first.
    pub fn webhook_secrets(&self) -> Result<Vec<&[u8]>, SecretsError> {
        let mut secrets = vec![self.require(WEBHOOK_SECRET_KEY)?.as_bytes()];
        if let Some(previous) = self.get(PREVIOUS_WEBHOOK_SECRET_KEY) {
            secrets.push(previous.as_bytes());
        }
        Ok(secrets)
    }
}

/// Fetches secret bundles by name.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<SecretBundle, SecretsError>;
}

#[async_trait]
impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    async fn fetch(&self, name: &str) -> Result<SecretBundle, SecretsError> {
        (**self).fetch(name).await
    }
}

/// In-memory secret store.
///
/// Used by the binary (populated from the environment) and by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    bundles: Arc<RwLock<HashMap<String, SecretBundle>>>,
    fail_on_fetch: Arc<AtomicBool>,
    fetches: Arc<AtomicUsize>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or replaces a bundle under its name.
    pub async fn insert(&self, bundle: SecretBundle) {
        self.bundles
            .write()
            .await
            .insert(bundle.name().to_string(), bundle);
    }

    /// Configures the store to fail every fetch.
    pub fn set_fail_on_fetch(&self, fail: bool) {
        self.fail_on_fetch.store(fail, Ordering::SeqCst);
    }

    /// Number of fetch calls made so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn fetch(&self, name: &str) -> Result<SecretBundle, SecretsError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.fail_on_fetch.load(Ordering::SeqCst) {
            return Err(SecretsError::Backend("secrets backend unavailable".to_string()));
        }

        self.bundles
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SecretsError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_is_never_cached() {
        let store = InMemorySecretStore::new();
        store
            .insert(SecretBundle::new("webhook").with(WEBHOOK_SECRET_KEY, "whsec_1"))
            .await;

        let bundle = store.fetch("webhook").await.unwrap();
        assert_eq!(bundle.require(WEBHOOK_SECRET_KEY).unwrap(), "whsec_1");

        store
            .insert(SecretBundle::new("webhook").with(WEBHOOK_SECRET_KEY, "whsec_2"))
            .await;
        let bundle = store.fetch("webhook").await.unwrap();
        assert_eq!(bundle.require(WEBHOOK_SECRET_KEY).unwrap(), "whsec_2");
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_bundle_and_key() {
        let store = InMemorySecretStore::new();
        assert!(matches!(
            store.fetch("nope").await,
            Err(SecretsError::NotFound(_))
        ));

        let bundle = SecretBundle::new("webhook").with(WEBHOOK_SECRET_KEY, "");
        assert!(matches!(
            bundle.require(WEBHOOK_SECRET_KEY),
            Err(SecretsError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_webhook_secrets_include_previous() {
        let bundle = SecretBundle::new("webhook")
            .with(WEBHOOK_SECRET_KEY, "new")
            .with(PREVIOUS_WEBHOOK_SECRET_KEY, "old");
        assert_eq!(
            bundle.webhook_secrets().unwrap(),
            vec![b"new".as_slice(), b"old".as_slice()]
        );
    }

    #[tokio::test]
    async fn test_fail_on_fetch() {
        let store = InMemorySecretStore::new();
        store.set_fail_on_fetch(true);
        assert!(matches!(
            store.fetch("webhook").await,
            Err(SecretsError::Backend(_))
        ));
    }
}
