use serde::{Deserialize, Serialize};

use super::identity::{Identity, Role};
use crate::errors::AuthError;

/// A reference to the administrator that started an impersonation.
///
/// Only constructible from an admin identity or from an admin id the authority
/// put into an impersonation token, so it always resolves to role admin.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AdminRef {
    id: String,
    username: Option<String>,
}

impl AdminRef {
    pub fn from_identity(identity: &Identity) -> Result<Self, AuthError> {
        if !identity.is_admin() {
            return Err(AuthError::Forbidden(format!(
                "'{}' is a {}, only admins can impersonate",
                identity.username, identity.role
            )));
        }
        Ok(AdminRef {
            id: identity.id.clone(),
            username: Some(identity.username.clone()),
        })
    }

    /// Admin id taken from an authority-issued impersonation token.
    pub(crate) fn from_authority_id(id: String) -> Self {
        AdminRef { id, username: None }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn role(&self) -> Role {
        Role::Admin
    }

    pub fn is(&self, identity: &Identity) -> bool {
        identity.is_admin() && identity.id == self.id
    }
}

/// The single impersonation layer of a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImpersonationContext {
    pub active: bool,
    pub acting_as: Identity,
    pub original_admin: AdminRef,
}

impl ImpersonationContext {
    pub fn new(acting_as: Identity, original_admin: AdminRef) -> Self {
        ImpersonationContext {
            active: true,
            acting_as,
            original_admin,
        }
    }
}
