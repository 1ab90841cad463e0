//! The process-wide session aggregate.
//!
//! Readers get derived facts (`is_authenticated`, `role`, `tenant_id`,
//! `is_impersonating`) computed from the current snapshot on every call.
//! Writers go through a handful of methods that each replace the whole
//! aggregate at once, so a credential is never observed next to a stale identity.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::models::{Credential, Identity, ImpersonationContext, Role};

/// Lifecycle phase of the session.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Nothing loaded yet.
    #[default]
    Uninitialized,
    /// A persisted credential is being validated.
    Bootstrapping,
    /// Credential and identity resolved.
    Authenticated,
    /// Validation failed or the user logged out.
    Invalid,
}

/// A credential and the identity it was issued for. Always replaced together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub credential: Credential,
    pub identity: Identity,
}

/// An immutable view of the aggregate at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    phase: SessionPhase,
    principal: Option<Principal>,
    impersonation: Option<ImpersonationContext>,
}

impl SessionSnapshot {
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated && self.principal.is_some()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.principal.as_ref().map(|p| &p.identity)
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.principal.as_ref().map(|p| &p.credential)
    }

    pub fn role(&self) -> Option<Role> {
        self.identity().map(|i| i.role)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.identity().and_then(|i| i.tenant_id.as_deref())
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonation.as_ref().map_or(false, |c| c.active)
    }

    pub fn impersonation(&self) -> Option<&ImpersonationContext> {
        self.impersonation.as_ref().filter(|c| c.active)
    }

    /// Authenticated with some credential other than `credential`.
    fn is_held_by_other(&self, credential: &Credential) -> bool {
        self.is_authenticated() && self.credential() != Some(credential)
    }

    fn authenticated(
        credential: Credential,
        identity: Identity,
        impersonation: Option<ImpersonationContext>,
    ) -> Self {
        SessionSnapshot {
            phase: SessionPhase::Authenticated,
            principal: Some(Principal {
                credential,
                identity,
            }),
            impersonation,
        }
    }

    fn invalid() -> Self {
        SessionSnapshot {
            phase: SessionPhase::Invalid,
            principal: None,
            impersonation: None,
        }
    }
}

/// Shared handle to the session aggregate. Clones point at the same state.
#[derive(Clone)]
pub struct SessionState {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        SessionState { tx: Arc::new(tx) }
    }

    /// A copy of the current aggregate.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified on every replacement of the aggregate.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.tx.borrow().phase()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_authenticated()
    }

    pub fn role(&self) -> Option<Role> {
        self.tx.borrow().role()
    }

    pub fn tenant_id(&self) -> Option<String> {
        self.tx.borrow().tenant_id().map(str::to_string)
    }

    pub fn is_impersonating(&self) -> bool {
        self.tx.borrow().is_impersonating()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.tx.borrow().identity().cloned()
    }

    pub(crate) fn credential(&self) -> Option<Credential> {
        self.tx.borrow().credential().cloned()
    }

    /// Authenticated as `identity`, no impersonation.
    pub fn set_authenticated(&self, identity: Identity, credential: Credential) {
        debug!(
            "Session authenticated as '{}' ({})",
            identity.username, identity.role
        );
        self.tx
            .send_replace(SessionSnapshot::authenticated(credential, identity, None));
    }

    /// Authenticated as `context.acting_as` on behalf of `context.original_admin`.
    pub fn set_impersonation(&self, credential: Credential, context: ImpersonationContext) {
        debug!(
            "Session impersonating '{}' ({}) for admin '{}'",
            context.acting_as.username,
            context.acting_as.role,
            context.original_admin.id()
        );
        let identity = context.acting_as.clone();
        self.tx.send_replace(SessionSnapshot::authenticated(
            credential,
            identity,
            Some(context),
        ));
    }

    /// Drop everything; the session becomes invalid.
    pub fn clear(&self) {
        debug!("Session cleared");
        self.tx.send_replace(SessionSnapshot::invalid());
    }

    /// Mark a bootstrap validation as in flight. Readers see no identity until it settles.
    ///
    /// Returns false, and changes nothing, when the session is already authenticated.
    pub(crate) fn begin_bootstrap(&self) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.is_authenticated() {
                return false;
            }
            *snapshot = SessionSnapshot {
                phase: SessionPhase::Bootstrapping,
                principal: None,
                impersonation: None,
            };
            true
        })
    }

    /// Publish the outcome of validating `credential`, unless the session was
    /// authenticated with a different credential in the meantime.
    pub(crate) fn settle_validated(
        &self,
        credential: Credential,
        identity: Identity,
        impersonation: Option<ImpersonationContext>,
    ) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.is_held_by_other(&credential) {
                return false;
            }
            *snapshot = SessionSnapshot::authenticated(credential, identity, impersonation);
            true
        })
    }

    /// Invalidate the session after `rejected` was refused, unless the session
    /// was authenticated with a different credential in the meantime.
    pub(crate) fn invalidate_rejected(&self, rejected: &Credential) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.is_held_by_other(rejected) {
                return false;
            }
            *snapshot = SessionSnapshot::invalid();
            true
        })
    }

    /// Swap in a refreshed identity, but only while `expected` is still the active
    /// credential. Returns false when another operation replaced the session meanwhile.
    pub(crate) fn refresh_identity(&self, expected: &Credential, identity: Identity) -> bool {
        self.tx.send_if_modified(|snapshot| {
            let current = match snapshot.principal.as_mut() {
                Some(p) if &p.credential == expected => p,
                _ => return false,
            };
            current.identity = identity.clone();
            if let Some(context) = snapshot.impersonation.as_mut() {
                context.acting_as = identity;
            }
            true
        })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
