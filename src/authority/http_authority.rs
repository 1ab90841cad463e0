use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::payloads::{
    ChangePasswordRequest, ImpersonateRequest, LoginRequest, MeResponse, TokenResponse,
    ValidateResponse,
};
use super::Authority;
use crate::config::AuthorityConfig;
use crate::errors::AuthError;
use crate::models::Credential;

const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Talks to the authority's `/auth` endpoints over HTTP.
pub struct HttpAuthority {
    base_url: String,
    client: Client,
}

impl HttpAuthority {
    pub fn new(config: &AuthorityConfig) -> Result<Self, AuthError> {
        info!(
            "Creating HTTP authority client for '{}' (timeout {}ms)",
            config.base_url, config.timeout_in_ms
        );
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_in_ms))
            .build()
            .map_err(|e| AuthError::Internal(format!("Error building HTTP client: {}", e)))?;
        Ok(HttpAuthority {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/{}", self.base_url, path)
    }

    /// Sends the request and returns the response if the status is a success,
    /// otherwise the classified error.
    async fn send(&self, builder: RequestBuilder, operation: &str) -> Result<Response, AuthError> {
        let request_id = Uuid::new_v4().to_string();
        debug!(
            event_name = "authority.request",
            event_domain = "authority",
            operation,
            request_id = request_id.as_str(),
            "sending request to authority"
        );

        let response = builder
            .header(REQUEST_ID_HEADER, &request_id)
            .send()
            .await
            .map_err(|e| {
                warn!(
                    event_name = "authority.transport_error",
                    event_domain = "authority",
                    operation,
                    request_id = request_id.as_str(),
                    "request failed: {}",
                    e
                );
                AuthError::from(e)
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = AuthError::from_status(status, &body);
        debug!(
            event_name = "authority.rejected",
            event_domain = "authority",
            operation,
            request_id = request_id.as_str(),
            status = status.as_u16(),
            "authority answered with an error: {}",
            error
        );
        Err(error)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation: &str,
    ) -> Result<T, AuthError> {
        let response = self.send(builder, operation).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(format!("Error reading response body: {}", e)))?;
        serde_json::from_str(&body).map_err(|e| {
            AuthError::InvalidResponse(format!("Error parsing {} response: {}", operation, e))
        })
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    fn get_name(&self) -> &str {
        &self.base_url
    }

    async fn login(&self, request: &LoginRequest) -> Result<TokenResponse, AuthError> {
        let builder = self.client.post(self.url("login")).json(request);
        self.send_json(builder, "login").await
    }

    async fn logout(&self, credential: &Credential) -> Result<(), AuthError> {
        let builder = self
            .client
            .post(self.url("logout"))
            .header("Authorization", credential.bearer());
        self.send(builder, "logout").await.map(|_| ())
    }

    async fn validate_token(&self, credential: &Credential) -> Result<ValidateResponse, AuthError> {
        let builder = self
            .client
            .get(self.url("validate-token"))
            .header("Authorization", credential.bearer());
        self.send_json(builder, "validate-token").await
    }

    async fn me(&self, credential: &Credential) -> Result<MeResponse, AuthError> {
        let builder = self
            .client
            .get(self.url("me"))
            .header("Authorization", credential.bearer());
        self.send_json(builder, "me").await
    }

    async fn change_password(
        &self,
        credential: &Credential,
        request: &ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        let builder = self
            .client
            .post(self.url("change-password"))
            .header("Authorization", credential.bearer())
            .json(request);
        self.send(builder, "change-password").await.map(|_| ())
    }

    async fn impersonate(
        &self,
        credential: &Credential,
        request: &ImpersonateRequest,
    ) -> Result<TokenResponse, AuthError> {
        let builder = self
            .client
            .post(self.url("impersonate"))
            .header("Authorization", credential.bearer())
            .json(request);
        self.send_json(builder, "impersonate").await
    }

    async fn end_impersonation(
        &self,
        credential: &Credential,
    ) -> Result<TokenResponse, AuthError> {
        let builder = self
            .client
            .post(self.url("end-impersonation"))
            .header("Authorization", credential.bearer());
        self.send_json(builder, "end-impersonation").await
    }
}
