use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use super::{CredentialStore, CREDENTIAL_KEY};
use crate::errors::AuthError;
use crate::models::Credential;

/// Configuration for the file backed store.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct FileStoreConfig {
    pub path: PathBuf,
}

/// Keeps the credential in a small JSON document of named slots,
/// `{"auth_token": "<bearer>"}`. A missing file or slot means logged out.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(config: &FileStoreConfig) -> Self {
        FileStore {
            path: config.path.clone(),
        }
    }

    async fn read_slots(&self) -> Result<HashMap<String, String>, AuthError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(AuthError::Store(format!(
                    "Error reading '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };
        match serde_json::from_str(&raw) {
            Ok(slots) => Ok(slots),
            Err(e) => {
                // A damaged file cannot hold a usable credential; treat it as empty
                // so the next save overwrites it.
                warn!(
                    "Ignoring unreadable credential file '{}': {}",
                    self.path.display(),
                    e
                );
                Ok(HashMap::new())
            }
        }
    }

    async fn write_slots(&self, slots: &HashMap<String, String>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AuthError::Store(format!("Error creating directory: {}", e)))?;
            }
        }
        let body = serde_json::to_vec_pretty(slots)
            .map_err(|e| AuthError::Store(format!("Error serializing slots: {}", e)))?;

        // Write next to the target and rename, so a crash never leaves half a token behind.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)
            .await
            .map_err(|e| AuthError::Store(format!("Error writing '{}': {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            AuthError::Store(format!("Error replacing '{}': {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn load(&self) -> Result<Option<Credential>, AuthError> {
        let slots = self.read_slots().await?;
        let credential = slots
            .get(CREDENTIAL_KEY)
            .map(Credential::new)
            .filter(|c| !c.is_blank());
        debug!(
            "Loaded credential slot from '{}': present={}",
            self.path.display(),
            credential.is_some()
        );
        Ok(credential)
    }

    async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let mut slots = self.read_slots().await?;
        slots.insert(CREDENTIAL_KEY.to_string(), credential.as_str().to_string());
        self.write_slots(&slots).await
    }

    async fn clear(&self) -> Result<(), AuthError> {
        let mut slots = self.read_slots().await?;
        if slots.remove(CREDENTIAL_KEY).is_none() {
            return Ok(());
        }
        self.write_slots(&slots).await
    }
}
