//! The shell's named routes and what each of them requires.
//!
//! Patterns use `:name` segments. `:resellerId` is the tenant parameter; a route
//! carrying it is tenant-scoped.

use std::collections::HashMap;

use serde::Serialize;

use super::decision::RouteRequirements;
use crate::models::{Identity, Role};

/// The path parameter that carries the tenant id.
pub const TENANT_PARAM: &str = "resellerId";

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const ADMIN_OR_RESELLER: &[Role] = &[Role::Admin, Role::Reseller];
const ANY_ROLE: &[Role] = &[Role::Admin, Role::Reseller, Role::User];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDef {
    pub name: &'static str,
    pub pattern: &'static str,
    pub requires_auth: bool,
    pub roles: Option<&'static [Role]>,
}

const fn public(name: &'static str, pattern: &'static str) -> RouteDef {
    RouteDef {
        name,
        pattern,
        requires_auth: false,
        roles: None,
    }
}

const fn restricted(name: &'static str, pattern: &'static str, roles: &'static [Role]) -> RouteDef {
    RouteDef {
        name,
        pattern,
        requires_auth: true,
        roles: Some(roles),
    }
}

/// Order matters: the first matching pattern wins, so literals precede
/// parameters at the same depth (`projects/upload` before `projects/:projectId`).
pub const ROUTES: &[RouteDef] = &[
    public("Login", LOGIN_PATH),
    public("Unauthorized", UNAUTHORIZED_PATH),
    restricted("AdminDashboard", "/admin/dashboard", ADMIN_ONLY),
    restricted("AdminResellers", "/admin/resellers", ADMIN_ONLY),
    restricted("AdminResellerDetail", "/admin/resellers/:resellerId", ADMIN_ONLY),
    restricted("AdminUsers", "/admin/users", ADMIN_ONLY),
    restricted("AdminSystemLogs", "/admin/logs", ADMIN_ONLY),
    restricted("AdminBackups", "/admin/backups", ADMIN_ONLY),
    restricted("AdminSettings", "/admin/settings", ADMIN_ONLY),
    restricted("ResellerDashboard", "/reseller/:resellerId/dashboard", ADMIN_OR_RESELLER),
    restricted("ResellerUsers", "/reseller/:resellerId/users", ADMIN_OR_RESELLER),
    restricted("ResellerUserDetail", "/reseller/:resellerId/users/:userId", ADMIN_OR_RESELLER),
    restricted("ResellerBranding", "/reseller/:resellerId/branding", ADMIN_OR_RESELLER),
    restricted("ResellerSettings", "/reseller/:resellerId/settings", ADMIN_OR_RESELLER),
    restricted("ResellerBackup", "/reseller/:resellerId/backup", ADMIN_OR_RESELLER),
    restricted("UserDashboard", "/reseller/:resellerId/user/dashboard", ANY_ROLE),
    restricted("UserProjects", "/reseller/:resellerId/user/projects", ANY_ROLE),
    restricted("UserProjectUpload", "/reseller/:resellerId/user/projects/upload", ANY_ROLE),
    restricted("UserProjectDetail", "/reseller/:resellerId/user/projects/:projectId", ANY_ROLE),
    restricted("UserProfile", "/reseller/:resellerId/user/profile", ANY_ROLE),
    RouteDef {
        name: "ProjectViewer",
        pattern: "/viewer/:resellerId/:projectId",
        requires_auth: true,
        roles: None,
    },
    public("ServerError", "/500"),
];

const NOT_FOUND: RouteDef = public("NotFound", "/:pathMatch");

/// Bare section paths and where they lead.
const REDIRECTS: &[(&str, &str)] = &[
    ("/", LOGIN_PATH),
    ("/admin", "/admin/dashboard"),
    ("/reseller/:resellerId", "/reseller/:resellerId/dashboard"),
    ("/reseller/:resellerId/user", "/reseller/:resellerId/user/dashboard"),
];

/// A path matched against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub route: RouteDef,
    pub path: String,
    pub params: HashMap<String, String>,
}

impl ResolvedRoute {
    pub fn name(&self) -> &'static str {
        self.route.name
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.params.get(TENANT_PARAM).map(String::as_str)
    }

    pub fn requirements(&self) -> RouteRequirements {
        RouteRequirements {
            requires_auth: self.route.requires_auth,
            roles: self.route.roles.map(<[Role]>::to_vec),
            tenant_id: self.tenant_id().map(str::to_string),
        }
    }
}

/// Matches `path` against the catalog, following section redirects.
/// Unknown paths resolve to the public `NotFound` route.
pub fn resolve(path: &str) -> ResolvedRoute {
    let path = normalize(path);

    let target = REDIRECTS
        .iter()
        .find_map(|(from, to)| match_pattern(from, &path).map(|params| build_path(to, &params)))
        .unwrap_or(path);

    for route in ROUTES {
        if let Some(params) = match_pattern(route.pattern, &target) {
            return ResolvedRoute {
                route: *route,
                path: target,
                params,
            };
        }
    }

    ResolvedRoute {
        route: NOT_FOUND,
        path: target,
        params: HashMap::new(),
    }
}

pub fn find(name: &str) -> Option<&'static RouteDef> {
    ROUTES.iter().find(|r| r.name == name)
}

/// Substitutes `:name` segments from `params`. Missing parameters stay as they are.
pub fn build_path(pattern: &str, params: &HashMap<String, String>) -> String {
    pattern
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => params
                .get(name)
                .cloned()
                .unwrap_or_else(|| segment.to_string()),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Where an identity lands after login or an impersonation switch.
pub fn landing_path(identity: &Identity) -> String {
    match (identity.role, identity.tenant_id.as_deref()) {
        (Role::Admin, _) => "/admin/dashboard".to_string(),
        (Role::Reseller, Some(tenant)) => format!("/reseller/{}/dashboard", tenant),
        (Role::User, Some(tenant)) => format!("/reseller/{}/user/dashboard", tenant),
        _ => LOGIN_PATH.to_string(),
    }
}

/// A navigation menu entry.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub name: &'static str,
    pub label: &'static str,
    pub path: String,
}

/// The menu shown to `role`, with the tenant filled in where the role has one.
pub fn navigation_for(role: Role, tenant_id: Option<&str>) -> Vec<NavItem> {
    let entries: &[(&'static str, &'static str)] = match role {
        Role::Admin => &[
            ("AdminDashboard", "Dashboard"),
            ("AdminResellers", "Resellers"),
            ("AdminUsers", "Users"),
            ("AdminSystemLogs", "System logs"),
            ("AdminBackups", "Backups"),
            ("AdminSettings", "Settings"),
        ],
        Role::Reseller => &[
            ("ResellerDashboard", "Dashboard"),
            ("ResellerUsers", "Users"),
            ("ResellerBranding", "Branding"),
            ("ResellerSettings", "Settings"),
            ("ResellerBackup", "Backup"),
        ],
        Role::User => &[
            ("UserDashboard", "Dashboard"),
            ("UserProjects", "Projects"),
            ("UserProjectUpload", "Upload"),
            ("UserProfile", "Profile"),
        ],
    };

    let mut params = HashMap::new();
    if let Some(tenant) = tenant_id {
        params.insert(TENANT_PARAM.to_string(), tenant.to_string());
    }

    entries
        .iter()
        .filter_map(|(name, label)| {
            find(name).map(|route| NavItem {
                name: route.name,
                label: *label,
                path: build_path(route.pattern, &params),
            })
        })
        .collect()
}

fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn match_pattern(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (expected, actual) in pattern_segments.iter().zip(&path_segments) {
        match expected.strip_prefix(':') {
            Some(name) if !actual.is_empty() => {
                params.insert(name.to_string(), actual.to_string());
            }
            Some(_) => return None,
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(params)
}
