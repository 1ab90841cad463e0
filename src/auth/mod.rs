pub mod client;
pub mod impersonation;

// Re-export so callers can do "use crate::auth::{AuthClient, ImpersonationTarget};"
pub use client::{AuthClient, SessionGrant};
pub use impersonation::{ImpersonationState, ImpersonationTarget};
