//! Per-navigation authorization.
//!
//! [`decide`] is the pure rule set; [`Guard`] wraps it with the one side effect
//! a navigation may have: bootstrapping a persisted credential before the first
//! authenticated page is shown.

pub mod decision;
pub mod permissions;
pub mod routes;

use std::time::Duration;

use tracing::{debug, warn};

pub use decision::{decide, GuardDecision, RouteRequirements};
pub use permissions::{can_access_tenant, has_permission, Permission};
pub use routes::{landing_path, navigation_for, resolve, ResolvedRoute};

use crate::auth::AuthClient;
use crate::utils::log_throttle::LogThrottle;

const REDIRECT_LOG_WINDOW: Duration = Duration::from_secs(60);

pub struct Guard {
    client: AuthClient,
    throttle: LogThrottle,
}

impl Guard {
    pub fn new(client: AuthClient) -> Self {
        Guard {
            client,
            throttle: LogThrottle::new(REDIRECT_LOG_WINDOW),
        }
    }

    /// Decides whether a navigation to a target with `requirements` may proceed.
    ///
    /// When the target needs a session and none is active, the persisted credential
    /// (if any) is validated first; concurrent navigations share that validation.
    pub async fn before_navigate(&self, requirements: &RouteRequirements) -> GuardDecision {
        let mut decision = decide(requirements, &self.client.session().snapshot());

        if decision == GuardDecision::RedirectToLogin {
            match self.client.bootstrap().await {
                Ok(Some(_)) => {
                    decision = decide(requirements, &self.client.session().snapshot());
                }
                Ok(None) => {}
                Err(e) => warn!("Bootstrap before navigation failed: {}", e),
            }
        }

        if decision != GuardDecision::Allow {
            self.log_redirect(decision, requirements);
        }
        decision
    }

    /// Resolves `path` against the route catalog and decides on it.
    pub async fn check_path(&self, path: &str) -> (ResolvedRoute, GuardDecision) {
        let resolved = resolve(path);
        let decision = self.before_navigate(&resolved.requirements()).await;
        (resolved, decision)
    }

    fn log_redirect(&self, decision: GuardDecision, requirements: &RouteRequirements) {
        let key = format!("guard.{}", decision.as_str());
        if let Some(suppressed_count) = self.throttle.should_emit(&key) {
            let snapshot = self.client.session().snapshot();
            debug!(
                event_name = "guard.redirect",
                event_domain = "guard",
                decision = decision.as_str(),
                role = snapshot.role().map(|r| r.as_str()).unwrap_or("anonymous"),
                target_tenant = requirements.tenant_id.as_deref().unwrap_or(""),
                suppressed_count,
                "navigation redirected"
            );
        }
    }
}
