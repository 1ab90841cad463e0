pub mod base;
pub mod file_store;
pub mod memory_store;

// Re-export the primary Store items so code outside can do
// "use crate::store::{CredentialStore, create_store};"
pub use base::{create_store, CredentialStore, CREDENTIAL_KEY};
