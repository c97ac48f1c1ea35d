use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Permission categories, used for the grouped `GET /permissions` listing
/// and for the role editor's groupings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PermissionCategory {
    Requests,
    Catalog,
    Sites,
    Users,
    Roles,
    Workflows,
    System,
}

impl PermissionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Catalog => "catalog",
            Self::Sites => "sites",
            Self::Users => "users",
            Self::Roles => "roles",
            Self::Workflows => "workflows",
            Self::System => "system",
        }
    }
}

/// The immutable, system-defined permission catalog.
///
/// Each permission is identified by its full name `category.action`. Keeping
/// this as an enum (rather than free-form strings in the database) makes
/// unknown permission names unrepresentable past the parsing boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    // Requests
    CreateRequests,
    ViewRequests,
    ApproveRequests,
    RejectRequests,
    FulfillRequests,
    // Catalog
    ViewItems,
    ManageItems,
    ManageCategories,
    // Sites
    ViewSites,
    ManageSites,
    // Users
    ViewUsers,
    ManageUsers,
    ManageAccess,
    // Roles
    ViewRoles,
    ManageRoles,
    // Workflows
    ViewWorkflows,
    ManageWorkflows,
    // System
    FullAdminAccess,
}

impl Permission {
    pub const ALL: [Permission; 18] = [
        Self::CreateRequests,
        Self::ViewRequests,
        Self::ApproveRequests,
        Self::RejectRequests,
        Self::FulfillRequests,
        Self::ViewItems,
        Self::ManageItems,
        Self::ManageCategories,
        Self::ViewSites,
        Self::ManageSites,
        Self::ViewUsers,
        Self::ManageUsers,
        Self::ManageAccess,
        Self::ViewRoles,
        Self::ManageRoles,
        Self::ViewWorkflows,
        Self::ManageWorkflows,
        Self::FullAdminAccess,
    ];

    /// Parse a `category.action` full name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.full_name() == s)
    }

    /// The `category.action` identifier.
    pub fn full_name(&self) -> &'static str {
        match self {
            Self::CreateRequests => "requests.create_requests",
            Self::ViewRequests => "requests.view_requests",
            Self::ApproveRequests => "requests.approve_requests",
            Self::RejectRequests => "requests.reject_requests",
            Self::FulfillRequests => "requests.fulfill_requests",
            Self::ViewItems => "catalog.view_items",
            Self::ManageItems => "catalog.manage_items",
            Self::ManageCategories => "catalog.manage_categories",
            Self::ViewSites => "sites.view_sites",
            Self::ManageSites => "sites.manage_sites",
            Self::ViewUsers => "users.view_users",
            Self::ManageUsers => "users.manage_users",
            Self::ManageAccess => "users.manage_access",
            Self::ViewRoles => "roles.view_roles",
            Self::ManageRoles => "roles.manage_roles",
            Self::ViewWorkflows => "workflows.view_workflows",
            Self::ManageWorkflows => "workflows.manage_workflows",
            Self::FullAdminAccess => "system.full_admin_access",
        }
    }

    pub fn category(&self) -> PermissionCategory {
        match self {
            Self::CreateRequests
            | Self::ViewRequests
            | Self::ApproveRequests
            | Self::RejectRequests
            | Self::FulfillRequests => PermissionCategory::Requests,
            Self::ViewItems | Self::ManageItems | Self::ManageCategories => PermissionCategory::Catalog,
            Self::ViewSites | Self::ManageSites => PermissionCategory::Sites,
            Self::ViewUsers | Self::ManageUsers | Self::ManageAccess => PermissionCategory::Users,
            Self::ViewRoles | Self::ManageRoles => PermissionCategory::Roles,
            Self::ViewWorkflows | Self::ManageWorkflows => PermissionCategory::Workflows,
            Self::FullAdminAccess => PermissionCategory::System,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::CreateRequests => "Create and submit purchase requests",
            Self::ViewRequests => "View purchase requests",
            Self::ApproveRequests => "Approve pending approval levels",
            Self::RejectRequests => "Reject pending approval levels",
            Self::FulfillRequests => "Mark approved requests as fulfilled",
            Self::ViewItems => "View catalog items",
            Self::ManageItems => "Create, edit and retire catalog items",
            Self::ManageCategories => "Manage catalog categories",
            Self::ViewSites => "View sites and areas",
            Self::ManageSites => "Create and edit sites and areas",
            Self::ViewUsers => "View staff accounts",
            Self::ManageUsers => "Create and edit staff accounts",
            Self::ManageAccess => "Edit site/area/category access grants",
            Self::ViewRoles => "View roles and their permissions",
            Self::ManageRoles => "Create, edit, clone and delete roles",
            Self::ViewWorkflows => "View approval workflows",
            Self::ManageWorkflows => "Create, edit and activate approval workflows",
            Self::FullAdminAccess => "Unrestricted access to every operation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_names_round_trip() {
        for p in Permission::ALL {
            assert_eq!(Permission::parse(p.full_name()), Some(p));
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(Permission::parse("requests.frobnicate"), None);
        assert_eq!(Permission::parse(""), None);
    }

    #[test]
    fn full_names_are_category_prefixed() {
        for p in Permission::ALL {
            let prefix = format!("{}.", p.category().as_str());
            assert!(p.full_name().starts_with(&prefix), "{}", p.full_name());
        }
    }
}
