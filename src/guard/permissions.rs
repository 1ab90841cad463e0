//! Role permission table, used by views to show or hide actions.

use std::fmt;

use serde::Serialize;

use crate::models::Role;
use crate::session::SessionSnapshot;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageUsers,
    ViewProjects,
    ManageBranding,
    CreateBackup,
    ViewOwnProjects,
    UploadFiles,
    ViewProfile,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageUsers => "manage_users",
            Permission::ViewProjects => "view_projects",
            Permission::ManageBranding => "manage_branding",
            Permission::CreateBackup => "create_backup",
            Permission::ViewOwnProjects => "view_own_projects",
            Permission::UploadFiles => "upload_files",
            Permission::ViewProfile => "view_profile",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RESELLER_PERMISSIONS: &[Permission] = &[
    Permission::ManageUsers,
    Permission::ViewProjects,
    Permission::ManageBranding,
    Permission::CreateBackup,
];

const USER_PERMISSIONS: &[Permission] = &[
    Permission::ViewOwnProjects,
    Permission::UploadFiles,
    Permission::ViewProfile,
];

/// Admins hold every permission.
pub fn role_has_permission(role: Role, permission: Permission) -> bool {
    match role {
        Role::Admin => true,
        Role::Reseller => RESELLER_PERMISSIONS.contains(&permission),
        Role::User => USER_PERMISSIONS.contains(&permission),
    }
}

pub fn has_permission(snapshot: &SessionSnapshot, permission: Permission) -> bool {
    if !snapshot.is_authenticated() {
        return false;
    }
    snapshot
        .role()
        .map_or(false, |role| role_has_permission(role, permission))
}

/// Whether the session may act on `tenant_id`: admins on any, everyone else on their own.
///
/// Stricter than the navigation guard, which lets resellers open other tenants' pages.
pub fn can_access_tenant(snapshot: &SessionSnapshot, tenant_id: &str) -> bool {
    if !snapshot.is_authenticated() {
        return false;
    }
    match snapshot.role() {
        Some(Role::Admin) => true,
        Some(_) => snapshot.tenant_id() == Some(tenant_id),
        None => false,
    }
}
