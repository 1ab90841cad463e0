use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{file_store::FileStore, memory_store::MemoryStore};
use crate::config::{StoreBackend, StoreConfig};
use crate::errors::AuthError;
use crate::models::Credential;

/// Fixed name of the durable slot that holds the bearer credential.
pub const CREDENTIAL_KEY: &str = "auth_token";

/// The CredentialStore trait abstracts the durable credential slot (load, save, clear).
/// Implementations perform no validation; they only store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>, AuthError>;
    async fn save(&self, credential: &Credential) -> Result<(), AuthError>;
    async fn clear(&self) -> Result<(), AuthError>;

    /// Clear the slot only while it still holds `expected`. Returns whether it was cleared.
    async fn clear_if(&self, expected: &Credential) -> Result<bool, AuthError> {
        if self.load().await?.as_ref() != Some(expected) {
            return Ok(false);
        }
        self.clear().await?;
        Ok(true)
    }

    fn is_durable(&self) -> bool {
        // Real stores survive restarts; the memory store overrides this
        // so startup can warn about it.
        true
    }
}

/// Creates a concrete store implementation based on the StoreConfig.
/// If `store.enabled = false` (or no backend is given), falls back to the memory store.
pub fn create_store(config: &StoreConfig) -> Arc<dyn CredentialStore> {
    if !config.enabled {
        info!("Credential store is disabled. Using MemoryStore.");
        return Arc::new(MemoryStore::new());
    }

    match &config.backend {
        Some(StoreBackend::File(file_config)) => {
            info!(
                "Using file credential store at '{}'",
                file_config.path.display()
            );
            Arc::new(FileStore::new(file_config))
        }
        None => {
            info!("Credential store enabled without a backend. Using MemoryStore.");
            Arc::new(MemoryStore::new())
        }
    }
}
