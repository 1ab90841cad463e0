//! Library exports for tenantauth, shared between the binary and tests.

pub mod auth;
pub mod authority;
pub mod config;
pub mod errors;
pub mod guard;
pub mod models;
pub mod notify;
pub mod session;
pub mod startup;
pub mod store;
pub mod utils;
