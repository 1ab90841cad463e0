//! Request and response bodies of the `/auth` endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Role, UserPayload};
use crate::utils::value::value_to_id;

#[derive(Serialize, Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Required by the authority for end-user logins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reseller_id: Option<String>,
}

/// Returned by login, impersonate and end-impersonation.
#[derive(Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: UserPayload,
    #[serde(default)]
    pub impersonation: Option<bool>,
    #[serde(default)]
    pub original_admin_id: Option<Value>,
}

impl TokenResponse {
    /// Admin id when the authority marks this token as an impersonation token.
    pub fn impersonating_admin_id(&self) -> Option<String> {
        if self.impersonation == Some(false) {
            return None;
        }
        self.original_admin_id
            .clone()
            .and_then(value_to_id)
            .or_else(|| self.user.original_admin_id())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MeResponse {
    pub user: UserPayload,
}

#[derive(Serialize, Debug, Clone)]
pub struct ImpersonateRequest {
    pub target_user_type: Role,
    pub target_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reseller_id: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}
