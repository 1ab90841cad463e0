use serde::Serialize;

use crate::models::Role;
use crate::session::SessionSnapshot;

/// What a navigation target asks of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteRequirements {
    pub requires_auth: bool,
    /// `None` admits every role.
    pub roles: Option<Vec<Role>>,
    /// Set when the target lives inside a tenant.
    pub tenant_id: Option<String>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    RedirectToUnauthorized,
}

impl GuardDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardDecision::Allow => "allow",
            GuardDecision::RedirectToLogin => "redirect_to_login",
            GuardDecision::RedirectToUnauthorized => "redirect_to_unauthorized",
        }
    }
}

/// Pure navigation decision; the first matching rule wins.
///
/// Tenant scoping is enforced for end users only. Resellers may open another
/// tenant's pages and admins see every tenant.
pub fn decide(requirements: &RouteRequirements, snapshot: &SessionSnapshot) -> GuardDecision {
    if requirements.requires_auth && !snapshot.is_authenticated() {
        return GuardDecision::RedirectToLogin;
    }

    if let Some(roles) = &requirements.roles {
        match snapshot.role() {
            Some(role) if roles.contains(&role) => {}
            _ => return GuardDecision::RedirectToUnauthorized,
        }
    }

    if let Some(target_tenant) = requirements.tenant_id.as_deref() {
        if snapshot.role() == Some(Role::User) && snapshot.tenant_id() != Some(target_tenant) {
            return GuardDecision::RedirectToUnauthorized;
        }
    }

    GuardDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdminRef, Credential, Identity, ImpersonationContext};
    use crate::session::SessionState;

    fn identity(id: &str, role: Role, tenant: Option<&str>) -> Identity {
        Identity {
            id: id.to_string(),
            username: id.to_string(),
            role,
            tenant_id: tenant.map(str::to_string),
            email: None,
            full_name: None,
            company_name: None,
        }
    }

    fn session_as(role: Role, tenant: Option<&str>) -> SessionSnapshot {
        let session = SessionState::new();
        session.set_authenticated(identity("x", role, tenant), Credential::new("t"));
        session.snapshot()
    }

    fn tenant_route(roles: &[Role], tenant: &str) -> RouteRequirements {
        RouteRequirements {
            requires_auth: true,
            roles: Some(roles.to_vec()),
            tenant_id: Some(tenant.to_string()),
        }
    }

    #[test]
    fn test_authentication_checked_before_roles() {
        let admin_only = RouteRequirements {
            requires_auth: true,
            roles: Some(vec![Role::Admin]),
            tenant_id: None,
        };
        assert_eq!(
            decide(&admin_only, &SessionSnapshot::default()),
            GuardDecision::RedirectToLogin
        );
        assert_eq!(
            decide(&admin_only, &session_as(Role::User, Some("T1"))),
            GuardDecision::RedirectToUnauthorized
        );
        assert_eq!(decide(&admin_only, &session_as(Role::Admin, None)), GuardDecision::Allow);
    }

    #[test]
    fn test_public_route_allows_anyone() {
        assert_eq!(
            decide(&RouteRequirements::default(), &SessionSnapshot::default()),
            GuardDecision::Allow
        );
    }

    #[test]
    fn test_user_is_confined_to_own_tenant() {
        let all = [Role::Admin, Role::Reseller, Role::User];
        let user = session_as(Role::User, Some("T42"));
        assert_eq!(decide(&tenant_route(&all, "T42"), &user), GuardDecision::Allow);
        assert_eq!(
            decide(&tenant_route(&all, "T99"), &user),
            GuardDecision::RedirectToUnauthorized
        );
    }

    #[test]
    fn test_reseller_and_admin_cross_tenants() {
        let route = tenant_route(&[Role::Admin, Role::Reseller], "other");
        assert_eq!(
            decide(&route, &session_as(Role::Reseller, Some("acme"))),
            GuardDecision::Allow
        );
        assert_eq!(decide(&route, &session_as(Role::Admin, None)), GuardDecision::Allow);
    }

    #[test]
    fn test_impersonated_user_is_tenant_scoped() {
        let session = SessionState::new();
        let admin = identity("1", Role::Admin, None);
        session.set_authenticated(admin.clone(), Credential::new("a"));
        session.set_impersonation(
            Credential::new("i"),
            ImpersonationContext::new(
                identity("9", Role::User, Some("T42")),
                AdminRef::from_identity(&admin).unwrap(),
            ),
        );
        let all = [Role::Admin, Role::Reseller, Role::User];
        let snapshot = session.snapshot();
        assert_eq!(decide(&tenant_route(&all, "T42"), &snapshot), GuardDecision::Allow);
        assert_eq!(
            decide(&tenant_route(&all, "T99"), &snapshot),
            GuardDecision::RedirectToUnauthorized
        );
    }
}
