use std::sync::Mutex;

use async_trait::async_trait;

use super::CredentialStore;
use crate::errors::AuthError;
use crate::models::Credential;

/// A process-local slot. Used when the durable store is disabled, and in tests.
pub struct MemoryStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            slot: Mutex::new(None),
        }
    }

    pub fn with_credential(credential: Credential) -> Self {
        MemoryStore {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.slot.lock().expect("memory store mutex poisoned").clone())
    }

    async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        *self.slot.lock().expect("memory store mutex poisoned") = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        *self.slot.lock().expect("memory store mutex poisoned") = None;
        Ok(())
    }

    async fn clear_if(&self, expected: &Credential) -> Result<bool, AuthError> {
        let mut slot = self.slot.lock().expect("memory store mutex poisoned");
        if slot.as_ref() != Some(expected) {
            return Ok(false);
        }
        *slot = None;
        Ok(true)
    }

    fn is_durable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        store.save(&Credential::new("abc")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(Credential::new("abc")));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        assert!(!store.is_durable());
    }

    /// Test that a conditional clear leaves a replaced credential alone.
    #[tokio::test]
    async fn test_clear_if_only_matching() {
        let store = MemoryStore::with_credential(Credential::new("fresh"));
        assert!(!store.clear_if(&Credential::new("stale")).await.unwrap());
        assert_eq!(store.load().await.unwrap(), Some(Credential::new("fresh")));

        assert!(store.clear_if(&Credential::new("fresh")).await.unwrap());
        assert_eq!(store.load().await.unwrap(), None);
    }
}
