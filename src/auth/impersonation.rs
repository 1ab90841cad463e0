//! Entry into and exit from an impersonated identity.
//!
//! Two states, `Normal` and `Impersonating`, with one layer at most. The checks
//! here run before any remote call; the `enter`/`exit` functions turn the
//! authority's answer into what gets committed to the session. Nothing in this
//! module touches the session itself, so a failed transition cannot leave it
//! half changed.

use tracing::warn;

use crate::authority::payloads::{ImpersonateRequest, TokenResponse};
use crate::errors::AuthError;
use crate::models::{AdminRef, Credential, Identity, ImpersonationContext, Role};
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpersonationState {
    Normal,
    Impersonating,
}

impl ImpersonationState {
    pub fn of(snapshot: &SessionSnapshot) -> Self {
        if snapshot.is_impersonating() {
            ImpersonationState::Impersonating
        } else {
            ImpersonationState::Normal
        }
    }
}

/// Who the administrator wants to act as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpersonationTarget {
    pub role: Role,
    pub id: String,
    pub tenant_id: Option<String>,
}

impl ImpersonationTarget {
    pub fn new(role: Role, id: impl Into<String>, tenant_id: Option<String>) -> Self {
        ImpersonationTarget {
            role,
            id: id.into(),
            tenant_id,
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.id.trim().is_empty() {
            return Err(AuthError::Validation(
                "impersonation target id is missing".to_string(),
            ));
        }
        match self.role {
            Role::Admin => Err(AuthError::Validation(
                "administrators cannot be impersonated".to_string(),
            )),
            Role::User if self.tenant_id.as_deref().map_or(true, |t| t.trim().is_empty()) => {
                Err(AuthError::Validation(
                    "impersonating a user requires its tenant id".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn to_request(&self) -> ImpersonateRequest {
        ImpersonateRequest {
            target_user_type: self.role,
            target_user_id: self.id.clone(),
            reseller_id: self.tenant_id.clone(),
        }
    }
}

/// Guard of `Normal --impersonate--> Impersonating`.
///
/// Returns the credential to send and the admin that will be recorded as
/// `original_admin`: the identity active right now.
pub fn check_enter(
    snapshot: &SessionSnapshot,
    target: &ImpersonationTarget,
) -> Result<(Credential, AdminRef), AuthError> {
    let (credential, identity) = match (snapshot.credential(), snapshot.identity()) {
        (Some(c), Some(i)) if snapshot.is_authenticated() => (c, i),
        _ => {
            return Err(AuthError::Forbidden(
                "impersonation requires an authenticated administrator".to_string(),
            ))
        }
    };
    // One layer only: re-impersonating is rejected, never stacked or swapped.
    if snapshot.is_impersonating() {
        return Err(AuthError::ImpersonationActive);
    }
    let admin = AdminRef::from_identity(identity)?;
    target.validate()?;
    Ok((credential.clone(), admin))
}

/// Guard of `Impersonating --end_impersonation--> Normal`.
pub fn check_exit(snapshot: &SessionSnapshot) -> Result<(Credential, AdminRef), AuthError> {
    match (snapshot.impersonation(), snapshot.credential()) {
        (Some(context), Some(credential)) => {
            Ok((credential.clone(), context.original_admin.clone()))
        }
        _ => Err(AuthError::Validation(
            "there is no active impersonation".to_string(),
        )),
    }
}

/// Builds the impersonated session from the authority's answer.
pub fn enter(
    response: TokenResponse,
    admin: AdminRef,
) -> Result<(Credential, ImpersonationContext), AuthError> {
    if let Some(reported) = response.impersonating_admin_id() {
        if reported != admin.id() {
            warn!(
                "Authority reported original admin '{}' but '{}' started the impersonation",
                reported,
                admin.id()
            );
        }
    }
    let credential = issued_credential(&response.access_token)?;
    let acting_as = Identity::try_from(response.user)?;
    Ok((credential, ImpersonationContext::new(acting_as, admin)))
}

/// Builds the restored admin session from the authority's answer.
/// The reissued identity must be the admin that started the impersonation.
pub fn exit(response: TokenResponse, admin: &AdminRef) -> Result<(Credential, Identity), AuthError> {
    let credential = issued_credential(&response.access_token)?;
    let identity = Identity::try_from(response.user)?;
    if !admin.is(&identity) {
        return Err(AuthError::InvalidResponse(format!(
            "end of impersonation returned '{}' ({}) instead of admin '{}'",
            identity.id,
            identity.role,
            admin.id()
        )));
    }
    Ok((credential, identity))
}

pub(crate) fn issued_credential(token: &str) -> Result<Credential, AuthError> {
    let credential = Credential::new(token);
    if credential.is_blank() {
        return Err(AuthError::InvalidResponse(
            "authority issued an empty access token".to_string(),
        ));
    }
    Ok(credential)
}
