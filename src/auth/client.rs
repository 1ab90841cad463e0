//! The auth protocol client.
//!
//! Every operation that can change the session runs on a spawned task: if the
//! caller stops waiting (the user navigated away), the remote answer is still
//! committed. Commits always replace credential and identity together.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::impersonation::{self, ImpersonationState, ImpersonationTarget};
use crate::authority::payloads::{
    ChangePasswordRequest, LoginRequest, TokenResponse, ValidateResponse,
};
use crate::authority::Authority;
use crate::errors::AuthError;
use crate::models::{AdminRef, Credential, Identity, ImpersonationContext};
use crate::notify::{Notice, Notifier};
use crate::session::SessionState;
use crate::store::CredentialStore;

type BootstrapFlight = Shared<BoxFuture<'static, Result<Option<Identity>, AuthError>>>;

/// What a successful login or impersonation switch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub credential: Credential,
    pub identity: Identity,
    pub impersonation: Option<ImpersonationContext>,
}

struct Inner {
    authority: Arc<dyn Authority>,
    store: Arc<dyn CredentialStore>,
    session: SessionState,
    notifier: Arc<dyn Notifier>,
    /// The bootstrap in flight, if any. Emptied by the bootstrap task itself.
    bootstrap: Mutex<Option<BootstrapFlight>>,
    /// Last credential the authority refused; never sent to validate again.
    rejected: Mutex<Option<Credential>>,
    /// Held across the check, remote call and commit of an impersonation switch.
    transition: AsyncMutex<()>,
}

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<Inner>,
}

impl AuthClient {
    pub fn new(
        authority: Arc<dyn Authority>,
        store: Arc<dyn CredentialStore>,
        session: SessionState,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        info!("Creating auth client for authority '{}'", authority.get_name());
        AuthClient {
            inner: Arc::new(Inner {
                authority,
                store,
                session,
                notifier,
                bootstrap: Mutex::new(None),
                rejected: Mutex::new(None),
                transition: AsyncMutex::new(()),
            }),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.inner.session
    }

    pub fn impersonation_state(&self) -> ImpersonationState {
        ImpersonationState::of(&self.inner.session.snapshot())
    }

    /// Authenticate with username and password. End users also pass their tenant.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        tenant_id: Option<&str>,
    ) -> Result<SessionGrant, AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            let e = AuthError::Validation("username and password are required".to_string());
            self.notify_failure(&e, "Login failed");
            return Err(e);
        }
        let request = LoginRequest {
            username: username.trim().to_string(),
            password: password.to_string(),
            reseller_id: tenant_id.map(str::to_string),
        };

        let this = self.clone();
        detached("login", async move {
            let result = this.login_inner(request).await;
            match &result {
                Ok(grant) => this.notify(Notice::success(format!(
                    "Logged in as {}",
                    grant.identity.username
                ))),
                Err(e) => this.notify_failure(e, "Login failed"),
            }
            result
        })
        .await
    }

    async fn login_inner(&self, request: LoginRequest) -> Result<SessionGrant, AuthError> {
        let response = self.inner.authority.login(&request).await.map_err(|e| {
            warn!("Login failed for '{}': {}", request.username, e);
            e
        })?;
        let grant = grant_from_token(response)?;

        // Persist before publishing: a failed write leaves the session untouched.
        self.inner.store.save(&grant.credential).await?;
        self.commit(&grant);
        *self.inner.rejected.lock().expect("rejected mutex poisoned") = None;

        info!(
            "User '{}' logged in as {}",
            grant.identity.username, grant.identity.role
        );
        Ok(grant)
    }

    /// Invalidate the credential remotely if possible, then always clear locally.
    pub async fn logout(&self) {
        let this = self.clone();
        if let Err(e) = tokio::spawn(async move { this.logout_inner().await }).await {
            error!("Logout task failed, clearing local session anyway: {}", e);
            self.clear_local().await;
        }
    }

    async fn logout_inner(&self) {
        let credential = match self.inner.session.credential() {
            Some(c) => Some(c),
            None => self.inner.store.load().await.unwrap_or_else(|e| {
                warn!("Could not read stored credential during logout: {}", e);
                None
            }),
        };

        if let Some(credential) = credential {
            let remote = AssertUnwindSafe(self.inner.authority.logout(&credential))
                .catch_unwind()
                .await;
            match remote {
                Ok(Ok(())) => debug!("Authority acknowledged logout"),
                Ok(Err(e)) => warn!("Remote logout failed, clearing locally: {}", e),
                Err(_) => error!("Remote logout panicked, clearing locally"),
            }
        }

        self.clear_local().await;
        info!("Logged out");
        self.notify(Notice::success("Logged out"));
    }

    /// Exchange a credential for an identity. On any failure the credential is
    /// purged and the session becomes invalid.
    ///
    /// Neither outcome is applied over a session that was authenticated with
    /// another credential while the validation ran.
    pub async fn validate(&self, credential: Credential) -> Result<Identity, AuthError> {
        let this = self.clone();
        detached("validate", async move { this.validate_inner(credential).await }).await
    }

    async fn validate_inner(&self, credential: Credential) -> Result<Identity, AuthError> {
        if self.was_rejected(&credential) {
            warn!("Refusing to validate a credential the authority already rejected");
            self.invalidate(&credential).await;
            return Err(AuthError::Unauthorized {
                status: 401,
                message: Some("credential was already rejected".to_string()),
            });
        }

        let outcome = match self.inner.authority.validate_token(&credential).await {
            Ok(response) => resolve_validation(response),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((identity, context)) => {
                if self
                    .inner
                    .session
                    .settle_validated(credential, identity.clone(), context)
                {
                    info!(
                        "Validated stored credential for '{}' ({})",
                        identity.username, identity.role
                    );
                } else {
                    debug!("Session replaced while validating; validated credential not applied");
                }
                Ok(identity)
            }
            Err(e) => {
                warn!("Credential validation failed, purging it: {}", e);
                *self.inner.rejected.lock().expect("rejected mutex poisoned") =
                    Some(credential.clone());
                self.invalidate(&credential).await;
                Err(e)
            }
        }
    }

    /// Resolve the persisted credential into an identity, once.
    ///
    /// Concurrent callers share the same in-flight validation; only one request
    /// reaches the authority. `Ok(None)` means there is nothing to bootstrap from.
    pub async fn bootstrap(&self) -> Result<Option<Identity>, AuthError> {
        let flight = {
            let mut slot = self.inner.bootstrap.lock().expect("bootstrap mutex poisoned");
            match slot.as_ref() {
                Some(flight) => {
                    debug!("Joining in-flight bootstrap validation");
                    flight.clone()
                }
                None => {
                    let this = self.clone();
                    let handle = tokio::spawn(async move {
                        let result = AssertUnwindSafe(this.run_bootstrap()).catch_unwind().await;
                        // Emptied before the result is published, even if nobody waits for it.
                        *this.inner.bootstrap.lock().expect("bootstrap mutex poisoned") = None;
                        result.unwrap_or_else(|_| {
                            error!("Bootstrap panicked");
                            Err(AuthError::Internal("bootstrap panicked".to_string()))
                        })
                    });
                    let flight = async move {
                        handle.await.unwrap_or_else(|e| {
                            Err(AuthError::Internal(format!("bootstrap task failed: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    async fn run_bootstrap(&self) -> Result<Option<Identity>, AuthError> {
        if self.inner.session.is_authenticated() {
            return Ok(self.inner.session.identity());
        }
        let credential = match self.inner.store.load().await? {
            Some(c) => c,
            None => {
                debug!("No stored credential to bootstrap from");
                return Ok(None);
            }
        };
        if !self.inner.session.begin_bootstrap() {
            debug!("Session authenticated while reading the store; skipping validation");
            return Ok(self.inner.session.identity());
        }
        self.validate_inner(credential).await.map(Some)
    }

    /// Re-read the current identity from `/auth/me`.
    pub async fn refresh_user(&self) -> Result<Identity, AuthError> {
        let credential = self.require_credential()?;
        let this = self.clone();
        detached("refresh", async move {
            let me = this.inner.authority.me(&credential).await?;
            let identity = Identity::try_from(me.user)?;
            if !this.inner.session.refresh_identity(&credential, identity.clone()) {
                debug!("Session changed while refreshing; refreshed identity not applied");
            }
            Ok(identity)
        })
        .await
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), AuthError> {
        let result = self.change_password_inner(current, new).await;
        match &result {
            Ok(()) => self.notify(Notice::success("Password changed")),
            Err(e) => self.notify_failure(e, "Password could not be changed"),
        }
        result
    }

    async fn change_password_inner(&self, current: &str, new: &str) -> Result<(), AuthError> {
        if current.is_empty() || new.trim().is_empty() {
            return Err(AuthError::Validation(
                "current and new password are required".to_string(),
            ));
        }
        let credential = self.require_credential()?;
        let request = ChangePasswordRequest {
            current_password: current.to_string(),
            new_password: new.to_string(),
        };
        self.inner
            .authority
            .change_password(&credential, &request)
            .await
    }

    /// Act as another identity. Only an administrator in `Normal` state may do this.
    ///
    /// Switches are serialized: of two concurrent calls from `Normal`, the second
    /// sees the first one's impersonation and fails with `ImpersonationActive`.
    pub async fn impersonate(&self, target: ImpersonationTarget) -> Result<SessionGrant, AuthError> {
        let this = self.clone();
        detached("impersonate", async move {
            let result = this.impersonate_inner(target).await;
            match &result {
                Ok(grant) => this.notify(Notice::success(format!(
                    "Impersonating {} {}",
                    grant.identity.role, grant.identity.username
                ))),
                Err(e) => this.notify_failure(e, "Impersonation failed"),
            }
            result
        })
        .await
    }

    async fn impersonate_inner(&self, target: ImpersonationTarget) -> Result<SessionGrant, AuthError> {
        let _transition = self.inner.transition.lock().await;
        let (credential, admin) =
            impersonation::check_enter(&self.inner.session.snapshot(), &target)?;

        let response = self
            .inner
            .authority
            .impersonate(&credential, &target.to_request())
            .await?;
        let (credential, context) = impersonation::enter(response, admin)?;
        self.inner.store.save(&credential).await?;

        let grant = SessionGrant {
            credential,
            identity: context.acting_as.clone(),
            impersonation: Some(context),
        };
        self.commit(&grant);
        info!(
            event_name = "impersonation.started",
            event_domain = "auth",
            admin_id = grant
                .impersonation
                .as_ref()
                .map(|c| c.original_admin.id())
                .unwrap_or_default(),
            target_role = target.role.as_str(),
            target_id = target.id.as_str(),
            "impersonation started"
        );
        Ok(grant)
    }

    /// Return to the original administrator with a freshly issued credential.
    /// On failure the impersonation stays in place.
    pub async fn end_impersonation(&self) -> Result<SessionGrant, AuthError> {
        let this = self.clone();
        detached("end-impersonation", async move {
            let result = this.end_impersonation_inner().await;
            match &result {
                Ok(_) => this.notify(Notice::success("Impersonation ended")),
                Err(e) => this.notify_failure(e, "Impersonation could not be ended"),
            }
            result
        })
        .await
    }

    async fn end_impersonation_inner(&self) -> Result<SessionGrant, AuthError> {
        let _transition = self.inner.transition.lock().await;
        let (credential, admin) = impersonation::check_exit(&self.inner.session.snapshot())?;

        let response = self.inner.authority.end_impersonation(&credential).await?;
        let (credential, identity) = impersonation::exit(response, &admin)?;
        self.inner.store.save(&credential).await?;

        let grant = SessionGrant {
            credential,
            identity,
            impersonation: None,
        };
        self.commit(&grant);
        info!(
            event_name = "impersonation.ended",
            event_domain = "auth",
            admin_id = admin.id(),
            "impersonation ended"
        );
        Ok(grant)
    }

    fn commit(&self, grant: &SessionGrant) {
        match &grant.impersonation {
            Some(context) => self
                .inner
                .session
                .set_impersonation(grant.credential.clone(), context.clone()),
            None => self
                .inner
                .session
                .set_authenticated(grant.identity.clone(), grant.credential.clone()),
        }
    }

    /// Logout path: drop the session and the stored credential unconditionally.
    async fn clear_local(&self) {
        self.inner.session.clear();
        if let Err(e) = self.inner.store.clear().await {
            error!("Could not purge stored credential: {}", e);
        }
    }

    /// Purge `rejected` from the session and the store, leaving alone whatever
    /// replaced it in the meantime.
    async fn invalidate(&self, rejected: &Credential) {
        if !self.inner.session.invalidate_rejected(rejected) {
            debug!("Session replaced while validating; keeping it");
        }
        match self.inner.store.clear_if(rejected).await {
            Ok(true) => debug!("Purged rejected credential from the store"),
            Ok(false) => debug!("Stored credential was replaced; nothing to purge"),
            Err(e) => error!("Could not purge stored credential: {}", e),
        }
    }

    fn require_credential(&self) -> Result<Credential, AuthError> {
        if !self.inner.session.is_authenticated() {
            return Err(AuthError::Forbidden("no authenticated session".to_string()));
        }
        self.inner
            .session
            .credential()
            .ok_or_else(|| AuthError::Forbidden("no authenticated session".to_string()))
    }

    fn was_rejected(&self, credential: &Credential) -> bool {
        self.inner
            .rejected
            .lock()
            .expect("rejected mutex poisoned")
            .as_ref()
            == Some(credential)
    }

    fn notify(&self, notice: Notice) {
        self.inner.notifier.notify(notice);
    }

    fn notify_failure(&self, error: &AuthError, fallback: &str) {
        self.notify(Notice::error(error.user_message(fallback)));
    }
}

/// Runs `task` on its own tokio task so dropping the caller does not cancel it.
async fn detached<F, T>(operation: &str, task: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(result) => result,
        Err(e) => {
            error!("{} task failed: {}", operation, e);
            Err(AuthError::Internal(format!("{} task failed: {}", operation, e)))
        }
    }
}

fn grant_from_token(response: TokenResponse) -> Result<SessionGrant, AuthError> {
    let admin_id = response.impersonating_admin_id();
    let credential = impersonation::issued_credential(&response.access_token)?;
    let identity = Identity::try_from(response.user)?;
    let impersonation = admin_id.map(|id| {
        ImpersonationContext::new(identity.clone(), AdminRef::from_authority_id(id))
    });
    Ok(SessionGrant {
        credential,
        identity,
        impersonation,
    })
}

/// The authority sends either RFC 3339 or a naive UTC timestamp.
fn parse_expiry(expires_at: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(expires_at)
        .map(|at| at.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(expires_at, "%Y-%m-%dT%H:%M:%S%.f").map(|at| at.and_utc())
        })
        .ok()
}

fn log_expiry(expires_at: &str) {
    match parse_expiry(expires_at) {
        Some(at) => debug!(
            "Stored credential expires at {} (in {}s)",
            at,
            (at - Utc::now()).num_seconds()
        ),
        None => debug!("Unrecognised credential expiry '{}'", expires_at),
    }
}

fn resolve_validation(
    response: ValidateResponse,
) -> Result<(Identity, Option<ImpersonationContext>), AuthError> {
    if !response.valid {
        return Err(AuthError::Unauthorized {
            status: 401,
            message: Some("credential is no longer valid".to_string()),
        });
    }
    let user = response
        .user
        .ok_or_else(|| AuthError::InvalidResponse("valid token without user".to_string()))?;
    if let Some(expires_at) = response.expires_at.as_deref() {
        log_expiry(expires_at);
    }
    let admin_id = user.original_admin_id();
    let identity = Identity::try_from(user)?;
    let context = admin_id.map(|id| {
        ImpersonationContext::new(identity.clone(), AdminRef::from_authority_id(id))
    });
    Ok((identity, context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::payloads::{ImpersonateRequest, MeResponse};
    use crate::models::UserPayload;
    use crate::notify::testing::RecordingNotifier;
    use crate::notify::NoticeLevel;
    use crate::session::SessionPhase;
    use crate::store::memory_store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers validate-token after a delay and counts the calls; logout always fails.
    #[derive(Default)]
    struct SlowAuthority {
        validations: AtomicUsize,
        logouts: AtomicUsize,
        valid: bool,
    }

    fn user(value: serde_json::Value) -> UserPayload {
        serde_json::from_value(value).unwrap()
    }

    #[async_trait]
    impl Authority for SlowAuthority {
        fn get_name(&self) -> &str {
            "slow"
        }

        async fn login(&self, request: &LoginRequest) -> Result<TokenResponse, AuthError> {
            if request.password != "secret" {
                return Err(AuthError::Unauthorized {
                    status: 401,
                    message: Some("Invalid credentials".to_string()),
                });
            }
            Ok(TokenResponse {
                access_token: format!("tok-{}", request.username),
                token_type: Some("bearer".to_string()),
                user: user(json!({"id": 1, "username": request.username, "role": "admin"})),
                impersonation: None,
                original_admin_id: None,
            })
        }

        async fn logout(&self, _credential: &Credential) -> Result<(), AuthError> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            Err(AuthError::Transport("offline".to_string()))
        }

        async fn validate_token(&self, _credential: &Credential) -> Result<ValidateResponse, AuthError> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(ValidateResponse {
                valid: self.valid,
                user: Some(user(json!({"id": 7, "username": "alice", "role": "user", "reseller_id": "T42"}))),
                expires_at: None,
            })
        }

        async fn me(&self, _credential: &Credential) -> Result<MeResponse, AuthError> {
            Ok(MeResponse {
                user: user(json!({"id": 7, "username": "alice", "role": "user",
                                  "reseller_id": "T42", "full_name": "Alice A."})),
            })
        }

        async fn change_password(
            &self,
            _credential: &Credential,
            _request: &ChangePasswordRequest,
        ) -> Result<(), AuthError> {
            Ok(())
        }

        async fn impersonate(
            &self,
            _credential: &Credential,
            _request: &ImpersonateRequest,
        ) -> Result<TokenResponse, AuthError> {
            Err(AuthError::Server { status: 500, message: None })
        }

        async fn end_impersonation(&self, _credential: &Credential) -> Result<TokenResponse, AuthError> {
            Err(AuthError::Server { status: 500, message: None })
        }
    }

    /// A memory slot whose load can lag behind or panic, and whose clear can fail.
    #[derive(Default)]
    struct ScriptedStore {
        slot: Mutex<Option<Credential>>,
        load_delay: Duration,
        fail_clear: bool,
        panic_on_load: bool,
    }

    impl ScriptedStore {
        fn holding(credential: &str) -> Self {
            ScriptedStore {
                slot: Mutex::new(Some(Credential::new(credential))),
                ..Default::default()
            }
        }

        fn stored(&self) -> Option<Credential> {
            self.slot.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CredentialStore for ScriptedStore {
        async fn load(&self) -> Result<Option<Credential>, AuthError> {
            if self.panic_on_load {
                panic!("credential store unavailable");
            }
            // Read first, answer late: the caller gets what was there when it asked.
            let credential = self.stored();
            tokio::time::sleep(self.load_delay).await;
            Ok(credential)
        }

        async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
            *self.slot.lock().unwrap() = Some(credential.clone());
            Ok(())
        }

        async fn clear(&self) -> Result<(), AuthError> {
            if self.fail_clear {
                return Err(AuthError::Store("disk is read-only".to_string()));
            }
            *self.slot.lock().unwrap() = None;
            Ok(())
        }
    }

    fn client_with(
        authority: Arc<SlowAuthority>,
        store: Arc<dyn CredentialStore>,
    ) -> (AuthClient, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let client = AuthClient::new(authority, store, SessionState::new(), notifier.clone());
        (client, notifier)
    }

    /// Test that concurrent bootstraps share one remote validation.
    #[tokio::test]
    async fn test_bootstrap_is_single_flight() {
        let authority = Arc::new(SlowAuthority {
            valid: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::with_credential(Credential::new("stored")));
        let (client, _) = client_with(authority.clone(), store);

        let (a, b, c) = tokio::join!(client.bootstrap(), client.bootstrap(), client.bootstrap());
        let expected = a.unwrap();
        assert_eq!(expected.as_ref().map(|i| i.id.as_str()), Some("7"));
        assert_eq!(b.unwrap(), expected);
        assert_eq!(c.unwrap(), expected);
        assert_eq!(authority.validations.load(Ordering::SeqCst), 1);
        assert_eq!(client.session().phase(), SessionPhase::Authenticated);

        // Once authenticated, bootstrap answers locally.
        client.bootstrap().await.unwrap();
        assert_eq!(authority.validations.load(Ordering::SeqCst), 1);
    }

    /// Test that an empty store bootstraps to nothing without a remote call.
    #[tokio::test]
    async fn test_bootstrap_without_credential() {
        let authority = Arc::new(SlowAuthority::default());
        let (client, _) = client_with(authority.clone(), Arc::new(MemoryStore::new()));
        assert_eq!(client.bootstrap().await.unwrap(), None);
        assert_eq!(authority.validations.load(Ordering::SeqCst), 0);
        assert_eq!(client.session().phase(), SessionPhase::Uninitialized);
    }

    /// Test that a rejected credential is purged and never validated again.
    #[tokio::test]
    async fn test_invalid_credential_is_purged_once() {
        let authority = Arc::new(SlowAuthority::default());
        let store = Arc::new(MemoryStore::with_credential(Credential::new("stale")));
        let (client, _) = client_with(authority.clone(), store.clone());

        let err = client.validate(Credential::new("stale")).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(client.session().phase(), SessionPhase::Invalid);

        let err = client.validate(Credential::new("stale")).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(authority.validations.load(Ordering::SeqCst), 1);
    }

    /// Test that logout clears local state even though the remote call fails.
    #[tokio::test]
    async fn test_logout_survives_remote_failure() {
        let authority = Arc::new(SlowAuthority::default());
        let store = Arc::new(MemoryStore::new());
        let (client, notifier) = client_with(authority.clone(), store.clone());

        client.login("root", "secret", None).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(Credential::new("tok-root")));

        client.logout().await;
        assert_eq!(authority.logouts.load(Ordering::SeqCst), 1);
        assert_eq!(client.session().phase(), SessionPhase::Invalid);
        assert_eq!(store.load().await.unwrap(), None);
        let levels: Vec<_> = notifier.taken().into_iter().map(|n| n.level).collect();
        assert_eq!(levels, vec![NoticeLevel::Success, NoticeLevel::Success]);
    }

    /// Test that a wrong password surfaces the authority's message and keeps the session empty.
    #[tokio::test]
    async fn test_login_failure_notifies() {
        let (client, notifier) =
            client_with(Arc::new(SlowAuthority::default()), Arc::new(MemoryStore::new()));
        let err = client.login("root", "nope", None).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!client.session().is_authenticated());
        assert_eq!(notifier.taken(), vec![Notice::error("Invalid credentials")]);
    }

    /// Test that blank input is refused before reaching the authority.
    #[tokio::test]
    async fn test_login_requires_input() {
        let (client, _) =
            client_with(Arc::new(SlowAuthority::default()), Arc::new(MemoryStore::new()));
        assert!(matches!(
            client.login(" ", "secret", None).await,
            Err(AuthError::Validation(_))
        ));
    }

    /// Test that refresh_user swaps in the identity the authority reports now.
    #[tokio::test]
    async fn test_refresh_user() {
        let authority = Arc::new(SlowAuthority {
            valid: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::with_credential(Credential::new("stored")));
        let (client, _) = client_with(authority, store);

        assert!(matches!(client.refresh_user().await, Err(AuthError::Forbidden(_))));

        client.bootstrap().await.unwrap();
        let identity = client.refresh_user().await.unwrap();
        assert_eq!(identity.full_name.as_deref(), Some("Alice A."));
        assert_eq!(client.session().identity(), Some(identity));
    }

    #[test]
    fn test_parse_expiry_formats() {
        let rfc = parse_expiry("2026-01-02T03:04:05+00:00").unwrap();
        let naive = parse_expiry("2026-01-02T03:04:05.123456").unwrap();
        assert_eq!(rfc.timestamp(), naive.timestamp());
        assert!(parse_expiry("tomorrow").is_none());
    }

    /// Test that a dropped caller does not cancel a login already sent.
    #[tokio::test]
    async fn test_login_commits_after_caller_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let (client, _) = client_with(Arc::new(SlowAuthority::default()), store.clone());

        let pending = client.login("root", "secret", None);
        // Poll once so the detached task is spawned, then drop the caller.
        let _ = tokio::time::timeout(Duration::from_millis(1), pending).await;
        let mut rx = client.session().subscribe();
        if !client.session().is_authenticated() {
            rx.changed().await.unwrap();
        }
        assert!(client.session().is_authenticated());
        assert_eq!(store.load().await.unwrap(), Some(Credential::new("tok-root")));
    }

    fn bootstrap_in_flight(client: &AuthClient) -> bool {
        client.inner.bootstrap.lock().unwrap().is_some()
    }

    /// Test that a login finishing while bootstrap reads the store is not erased.
    #[tokio::test]
    async fn test_bootstrap_keeps_login_made_during_store_read() {
        let authority = Arc::new(SlowAuthority::default());
        let store = Arc::new(ScriptedStore {
            load_delay: Duration::from_millis(50),
            ..ScriptedStore::holding("stale")
        });
        let (client, _) = client_with(authority.clone(), store.clone());

        let booting = tokio::spawn({
            let client = client.clone();
            async move { client.bootstrap().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.login("root", "secret", None).await.unwrap();

        let restored = booting.await.unwrap().unwrap();
        assert_eq!(restored.map(|i| i.username), Some("root".to_string()));
        assert_eq!(authority.validations.load(Ordering::SeqCst), 0);
        assert!(client.session().is_authenticated());
        assert_eq!(client.session().credential(), Some(Credential::new("tok-root")));
        assert_eq!(store.stored(), Some(Credential::new("tok-root")));
    }

    /// Test that rejecting the stale credential leaves a login committed during validation intact.
    #[tokio::test]
    async fn test_rejection_spares_login_made_during_validation() {
        let authority = Arc::new(SlowAuthority::default());
        let store = Arc::new(ScriptedStore::holding("stale"));
        let (client, _) = client_with(authority.clone(), store.clone());

        let mut rx = client.session().subscribe();
        let booting = tokio::spawn({
            let client = client.clone();
            async move { client.bootstrap().await }
        });
        rx.wait_for(|s| s.phase() == SessionPhase::Bootstrapping)
            .await
            .unwrap();
        client.login("root", "secret", None).await.unwrap();

        let err = booting.await.unwrap().unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(authority.validations.load(Ordering::SeqCst), 1);
        assert_eq!(client.session().phase(), SessionPhase::Authenticated);
        assert_eq!(client.session().credential(), Some(Credential::new("tok-root")));
        assert_eq!(store.stored(), Some(Credential::new("tok-root")));
    }

    /// Test that a credential still stored after a failed purge settles the session to invalid.
    #[tokio::test]
    async fn test_unpurged_rejected_credential_settles_invalid() {
        let authority = Arc::new(SlowAuthority::default());
        let store = Arc::new(ScriptedStore {
            fail_clear: true,
            ..ScriptedStore::holding("stale")
        });
        let (client, _) = client_with(authority.clone(), store.clone());

        assert!(client.bootstrap().await.unwrap_err().is_unauthorized());
        assert_eq!(client.session().phase(), SessionPhase::Invalid);
        assert_eq!(store.stored(), Some(Credential::new("stale")));

        let err = client.bootstrap().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(client.session().phase(), SessionPhase::Invalid);
        assert_eq!(authority.validations.load(Ordering::SeqCst), 1);
    }

    /// Test that a bootstrap nobody waited for does not answer the next one.
    #[tokio::test]
    async fn test_abandoned_bootstrap_is_not_reused() {
        let authority = Arc::new(SlowAuthority::default());
        let store = Arc::new(MemoryStore::with_credential(Credential::new("first")));
        let (client, _) = client_with(authority.clone(), store.clone());

        let _ = tokio::time::timeout(Duration::from_millis(1), client.bootstrap()).await;
        while bootstrap_in_flight(&client) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(authority.validations.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().await.unwrap(), None);

        store.save(&Credential::new("second")).await.unwrap();
        assert!(client.bootstrap().await.unwrap_err().is_unauthorized());
        assert_eq!(authority.validations.load(Ordering::SeqCst), 2);
    }

    /// Test that logout purges the store even when the logout task itself dies.
    #[tokio::test]
    async fn test_logout_task_failure_still_purges() {
        let store = Arc::new(ScriptedStore {
            panic_on_load: true,
            ..ScriptedStore::holding("stored")
        });
        let (client, _) = client_with(Arc::new(SlowAuthority::default()), store.clone());

        client.logout().await;
        assert_eq!(client.session().phase(), SessionPhase::Invalid);
        assert_eq!(store.stored(), None);
    }
}
