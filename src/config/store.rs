use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::store::file_store::FileStoreConfig;

/// A wrapper for the credential store configuration:
/// - enabled: if false, the credential only lives in memory (MemoryStore).
/// - backend: the durable backend (file, etc.).
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct StoreConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub backend: Option<StoreBackend>,
}

/// The existing store backends. We differentiate them via a "type" tag in the YAML.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
#[serde(tag = "type")]
pub enum StoreBackend {
    #[serde(rename = "file")]
    File(FileStoreConfig),
}
