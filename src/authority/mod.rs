pub mod base;
pub mod http_authority;
pub mod payloads;

// Re-export from base.rs so we can do "use crate::authority::*;"
pub use base::Authority;
pub use http_authority::HttpAuthority;
