use async_trait::async_trait;
use uuid::Uuid;

use super::catalog::Permission;
use super::principal::{LocationKey, Principal};

/// Policy evaluator trait for pluggable authorization logic
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Check the principal's permission at an exact location key.
    async fn can(&self, principal: &Principal, permission: Permission, location: &LocationKey) -> bool;

    /// Check the principal's permission at a location covering a concrete
    /// request site/area pair.
    async fn can_at(
        &self,
        principal: &Principal,
        permission: Permission,
        site_id: Uuid,
        area_id: Option<Uuid>,
    ) -> bool;
}

/// Default policy evaluator with standard scoped-RBAC logic
///
/// Evaluation order:
/// 1. `system.full_admin_access` on any grant -> allow
/// 2. grant at a matching/covering location carrying the permission -> allow
/// 3. deny
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEvaluator for DefaultPolicyEvaluator {
    async fn can(&self, principal: &Principal, permission: Permission, location: &LocationKey) -> bool {
        if principal.is_super_admin() {
            tracing::debug!(
                user_id = %principal.user_id,
                permission = %permission.full_name(),
                "super_admin bypass"
            );
            return true;
        }

        if principal.has_permission(permission, location) {
            tracing::debug!(
                user_id = %principal.user_id,
                permission = %permission.full_name(),
                location = ?location,
                "permission match"
            );
            return true;
        }

        tracing::debug!(
            user_id = %principal.user_id,
            permission = %permission.full_name(),
            location = ?location,
            "permission denied"
        );
        false
    }

    async fn can_at(
        &self,
        principal: &Principal,
        permission: Permission,
        site_id: Uuid,
        area_id: Option<Uuid>,
    ) -> bool {
        if principal.is_super_admin() {
            tracing::debug!(
                user_id = %principal.user_id,
                permission = %permission.full_name(),
                "super_admin bypass"
            );
            return true;
        }

        let allowed = principal
            .permissions_covering(site_id, area_id)
            .contains(&permission);

        tracing::debug!(
            user_id = %principal.user_id,
            permission = %permission.full_name(),
            site_id = %site_id,
            area_id = ?area_id,
            allowed,
            "covering permission check"
        );
        allowed
    }
}
