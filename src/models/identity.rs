use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AuthError;
use crate::utils::value::value_to_id;

/// The three roles of the shell.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Reseller,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Reseller => "reseller",
            Role::User => "user",
        }
    }

    /// Reseller and user identities live inside a tenant.
    pub fn is_tenant_scoped(&self) -> bool {
        !matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "reseller" => Ok(Role::Reseller),
            "user" => Ok(Role::User),
            other => Err(AuthError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// A resolved identity. Replaced wholesale on every successful auth operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub role: Role,
    /// The tenant ("reseller") the identity belongs to; `None` for admins.
    pub tenant_id: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub company_name: Option<String>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// The `user` object as the authority sends it.
///
/// Ids arrive as numbers for admins and users and as strings for resellers,
/// so they are kept as raw JSON until conversion.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct UserPayload {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub reseller_id: Option<String>,
    #[serde(default)]
    pub impersonated_by: Option<Value>,
    #[serde(default)]
    pub original_admin: Option<Value>,
}

impl UserPayload {
    /// Id of the administrator behind an impersonation token, if this payload is one.
    pub fn original_admin_id(&self) -> Option<String> {
        self.original_admin
            .clone()
            .and_then(value_to_id)
            .or_else(|| self.impersonated_by.clone().and_then(value_to_id))
    }
}

impl TryFrom<UserPayload> for Identity {
    type Error = AuthError;

    fn try_from(payload: UserPayload) -> Result<Self, Self::Error> {
        let id = value_to_id(payload.id)
            .ok_or_else(|| AuthError::InvalidResponse("user payload has no id".to_string()))?;
        let role = payload
            .role
            .as_deref()
            .ok_or_else(|| AuthError::InvalidResponse(format!("user '{}' has no role", id)))?
            .parse::<Role>()
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let tenant_id = payload.reseller_id.filter(|t| !t.trim().is_empty());
        if role.is_tenant_scoped() && tenant_id.is_none() {
            return Err(AuthError::InvalidResponse(format!(
                "{} '{}' is not attached to a tenant",
                role, id
            )));
        }

        Ok(Identity {
            username: payload.username.unwrap_or_else(|| id.clone()),
            id,
            role,
            tenant_id,
            email: payload.email,
            full_name: payload.full_name,
            company_name: payload.company_name,
        })
    }
}
