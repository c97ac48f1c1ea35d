use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use crate::authz::Permission;
use crate::errors::AppError;
use crate::workflow::TRIGGER_REQUEST_SUBMITTED;

/// Ids produced by seeding a fresh organization.
pub struct SeededOrg {
    pub org_id: Uuid,
    pub admin_role_id: Uuid,
    pub manager_role_id: Uuid,
    pub requester_role_id: Uuid,
    pub default_workflow_id: Uuid,
}

/// Create an organization with its system roles and the default
/// `request_submitted` workflow. Runs inside the caller's transaction so a
/// failed registration leaves nothing behind.
///
/// The default workflow guarantees every trigger type has an active path
/// from the first submitted request onward.
pub async fn create_organization(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    now: DateTime<Utc>,
) -> Result<SeededOrg, AppError> {
    let org_id = Uuid::new_v4();

    sqlx::query("INSERT INTO organizations (id, name, created_at) VALUES (?, ?, ?)")
        .bind(org_id.to_string())
        .bind(name)
        .bind(now)
        .execute(&mut **tx)
        .await?;

    let admin_role_id = seed_role(
        tx,
        org_id,
        "Administrator",
        "Full access to every operation",
        "organization",
        "#dc2626",
        &[Permission::FullAdminAccess],
        now,
    )
    .await?;

    let manager_role_id = seed_role(
        tx,
        org_id,
        "Manager",
        "Reviews and fulfills purchase requests",
        "site",
        "#2563eb",
        &[
            Permission::ViewRequests,
            Permission::ApproveRequests,
            Permission::RejectRequests,
            Permission::FulfillRequests,
            Permission::ViewItems,
            Permission::ViewSites,
            Permission::ViewWorkflows,
        ],
        now,
    )
    .await?;

    let requester_role_id = seed_role(
        tx,
        org_id,
        "Requester",
        "Submits purchase requests",
        "organization",
        "#16a34a",
        &[
            Permission::CreateRequests,
            Permission::ViewRequests,
            Permission::ViewItems,
        ],
        now,
    )
    .await?;

    let default_workflow_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO workflows (id, org_id, name, description, trigger_type, is_default, is_active, version, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 1, 1, 1, ?, ?)",
    )
    .bind(default_workflow_id.to_string())
    .bind(org_id.to_string())
    .bind("Standard approval")
    .bind("Single manager sign-off")
    .bind(TRIGGER_REQUEST_SUBMITTED)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    sqlx::query("INSERT INTO workflow_levels (workflow_id, level_order, role_id) VALUES (?, 1, ?)")
        .bind(default_workflow_id.to_string())
        .bind(manager_role_id.to_string())
        .execute(&mut **tx)
        .await?;

    tracing::info!(org_id = %org_id, name, "seeded organization");

    Ok(SeededOrg {
        org_id,
        admin_role_id,
        manager_role_id,
        requester_role_id,
        default_workflow_id,
    })
}

#[allow(clippy::too_many_arguments)]
async fn seed_role(
    tx: &mut Transaction<'_, Sqlite>,
    org_id: Uuid,
    name: &str,
    description: &str,
    scope: &str,
    color: &str,
    permissions: &[Permission],
    now: DateTime<Utc>,
) -> Result<Uuid, AppError> {
    let role_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO roles (id, org_id, name, description, scope, color, is_system, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(role_id.to_string())
    .bind(org_id.to_string())
    .bind(name)
    .bind(description)
    .bind(scope)
    .bind(color)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    for permission in permissions {
        sqlx::query("INSERT INTO role_permissions (role_id, permission, created_at) VALUES (?, ?, ?)")
            .bind(role_id.to_string())
            .bind(permission.full_name())
            .bind(now)
            .execute(&mut **tx)
            .await?;
    }

    Ok(role_id)
}
