pub mod credential;
pub mod identity;
pub mod impersonation;

// Re-export the model types so callers can do "use crate::models::{Identity, Role};"
pub use credential::Credential;
pub use identity::{Identity, Role, UserPayload};
pub use impersonation::{AdminRef, ImpersonationContext};
