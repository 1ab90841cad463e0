use async_trait::async_trait;

use super::payloads::{
    ChangePasswordRequest, ImpersonateRequest, LoginRequest, MeResponse, TokenResponse,
    ValidateResponse,
};
use crate::errors::AuthError;
use crate::models::Credential;

/// The remote authority that issues, validates and revokes credentials.
///
/// Every call is a single request; failures come back already classified.
#[async_trait]
pub trait Authority: Send + Sync {
    /// A descriptive name for logs.
    fn get_name(&self) -> &str;

    async fn login(&self, request: &LoginRequest) -> Result<TokenResponse, AuthError>;

    async fn logout(&self, credential: &Credential) -> Result<(), AuthError>;

    async fn validate_token(&self, credential: &Credential) -> Result<ValidateResponse, AuthError>;

    async fn me(&self, credential: &Credential) -> Result<MeResponse, AuthError>;

    async fn change_password(
        &self,
        credential: &Credential,
        request: &ChangePasswordRequest,
    ) -> Result<(), AuthError>;

    async fn impersonate(
        &self,
        credential: &Credential,
        request: &ImpersonateRequest,
    ) -> Result<TokenResponse, AuthError>;

    async fn end_impersonation(&self, credential: &Credential)
        -> Result<TokenResponse, AuthError>;
}
