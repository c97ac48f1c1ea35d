pub mod auth;
pub mod catalog;
pub mod health;
pub mod requests;
pub mod roles;
pub mod sites;
pub mod users;
pub mod workflows;

use crate::app::AppState;
use crate::authz::{load_principal, DefaultPolicyEvaluator, LocationKey, Permission, PolicyEvaluator, Principal};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;

/// Load the caller's grants and require an organization-wide permission.
/// Management surfaces (roles, users, workflows, reference data) are gated
/// here; the request approval gates live in `routes::requests` because they
/// are location-scoped.
pub(crate) async fn require_permission(
    state: &AppState,
    auth: &AuthUser,
    permission: Permission,
) -> AppResult<Principal> {
    let principal = load_principal(&state.pool, auth).await;
    let evaluator = DefaultPolicyEvaluator::new();

    if evaluator.can(&principal, permission, &LocationKey::OrgWide).await {
        Ok(principal)
    } else {
        Err(AppError::forbidden(format!(
            "missing permission {}",
            permission.full_name()
        )))
    }
}
