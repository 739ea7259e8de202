//! Credential seam for the IP reputation provider
//!
//! Mirrors the source implementation's fallback order (environment
//! variable first, then a stored value) without ever writing the key to
//! the DNS analyzer's plaintext JSON config.

use crate::{SecretManager, SecretString, SecretType};
use async_trait::async_trait;
use std::sync::Arc;

pub const REPUTATION_API_KEY_ENV: &str = "PORTWATCH_ABUSEIPDB_KEY";
const REPUTATION_SECRET_KEY: &str = "reputation_api_key";

#[async_trait]
pub trait ReputationCredential: Send + Sync {
    async fn api_key(&self) -> Option<SecretString>;
}

/// Default credential source: checks the environment variable, then falls
/// back to the secret manager's encrypted store.
pub struct DefaultReputationCredential {
    manager: Arc<SecretManager>,
}

impl DefaultReputationCredential {
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ReputationCredential for DefaultReputationCredential {
    async fn api_key(&self) -> Option<SecretString> {
        if let Ok(value) = std::env::var(REPUTATION_API_KEY_ENV) {
            if !value.is_empty() {
                return Some(SecretString::from(value));
            }
        }

        self.manager
            .get_secret(REPUTATION_SECRET_KEY)
            .await
            .ok()
            .flatten()
    }
}

/// Persist a reputation API key into the encrypted store (used by the
/// settings endpoint / CLI, never by the DNS analyzer's config file).
pub async fn store_api_key(manager: &SecretManager, key: SecretString) -> anyhow::Result<()> {
    manager
        .store_secret(
            REPUTATION_SECRET_KEY,
            key,
            SecretType::ApiToken,
            "IP reputation provider API key".to_string(),
            None,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[tokio::test]
    async fn falls_back_to_stored_secret_when_env_absent() {
        std::env::remove_var(REPUTATION_API_KEY_ENV);
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(SecretManager::new(store));
        store_api_key(&manager, SecretString::from("strong-api-key-0123456789"))
            .await
            .unwrap();

        let cred = DefaultReputationCredential::new(manager);
        let key = cred.api_key().await;
        assert_eq!(key.unwrap().expose_secret(), "strong-api-key-0123456789");
    }

    #[tokio::test]
    async fn no_credential_configured_returns_none() {
        std::env::remove_var(REPUTATION_API_KEY_ENV);
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(SecretManager::new(store));
        let cred = DefaultReputationCredential::new(manager);
        assert!(cred.api_key().await.is_none());
    }
}
