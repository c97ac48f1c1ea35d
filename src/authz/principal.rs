use std::collections::HashSet;

use uuid::Uuid;

use super::catalog::Permission;

/// Where a role grant applies. Site and area keys are distinct: a grant at
/// area scope says nothing about the parent site, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationKey {
    OrgWide,
    Site(Uuid),
    Area(Uuid),
}

impl LocationKey {
    pub fn from_ids(site_id: Option<Uuid>, area_id: Option<Uuid>) -> Self {
        match (site_id, area_id) {
            (_, Some(area)) => LocationKey::Area(area),
            (Some(site), None) => LocationKey::Site(site),
            (None, None) => LocationKey::OrgWide,
        }
    }

    /// Whether a grant at this key covers a concrete request location.
    pub fn covers(&self, site_id: Uuid, area_id: Option<Uuid>) -> bool {
        match self {
            LocationKey::OrgWide => true,
            LocationKey::Site(s) => *s == site_id,
            LocationKey::Area(a) => area_id == Some(*a),
        }
    }

    /// Whether this grant applies to an exact location query. Org-wide
    /// grants match every query; site/area keys match only themselves.
    pub fn matches(&self, queried: &LocationKey) -> bool {
        *self == LocationKey::OrgWide || self == queried
    }
}

/// One role held by a user at one location.
#[derive(Debug, Clone)]
pub struct RoleGrant {
    pub role_id: Uuid,
    pub location: LocationKey,
    pub permissions: HashSet<Permission>,
}

/// Principal represents the authenticated user with their resolved grants.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub grants: Vec<RoleGrant>,
}

impl Principal {
    pub fn new(user_id: Uuid, org_id: Uuid) -> Self {
        Self {
            user_id,
            org_id,
            grants: Vec::new(),
        }
    }

    pub fn with_grant(
        mut self,
        role_id: Uuid,
        location: LocationKey,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        self.grants.push(RoleGrant {
            role_id,
            location,
            permissions: permissions.into_iter().collect(),
        });
        self
    }

    /// Effective permission set for an exact location query: the union of
    /// all grants whose key matches. Purely additive, no deny semantics.
    pub fn permissions_at(&self, location: &LocationKey) -> HashSet<Permission> {
        self.grants
            .iter()
            .filter(|g| g.location.matches(location))
            .flat_map(|g| g.permissions.iter().copied())
            .collect()
    }

    /// Effective permission set covering a concrete request location.
    pub fn permissions_covering(&self, site_id: Uuid, area_id: Option<Uuid>) -> HashSet<Permission> {
        self.grants
            .iter()
            .filter(|g| g.location.covers(site_id, area_id))
            .flat_map(|g| g.permissions.iter().copied())
            .collect()
    }

    pub fn has_permission(&self, permission: Permission, location: &LocationKey) -> bool {
        self.grants
            .iter()
            .any(|g| g.location.matches(location) && g.permissions.contains(&permission))
    }

    pub fn has_any_permission(&self, permissions: &[Permission], location: &LocationKey) -> bool {
        permissions.iter().any(|p| self.has_permission(*p, location))
    }

    pub fn has_all_permissions(&self, permissions: &[Permission], location: &LocationKey) -> bool {
        permissions.iter().all(|p| self.has_permission(*p, location))
    }

    pub fn is_super_admin(&self) -> bool {
        self.grants
            .iter()
            .any(|g| g.permissions.contains(&Permission::FullAdminAccess))
    }

    /// The strict role-bound approval check: does the user hold this
    /// specific role at a location covering the request?
    pub fn holds_role_covering(&self, role_id: Uuid, site_id: Uuid, area_id: Option<Uuid>) -> bool {
        self.grants
            .iter()
            .any(|g| g.role_id == role_id && g.location.covers(site_id, area_id))
    }
}
