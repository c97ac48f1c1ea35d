use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Permission;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::role::{
    DbRole, PermissionGroup, PermissionInfo, Role, RoleCloneRequest, RoleCreateRequest, RoleUpdateRequest,
};
use crate::routes::require_permission;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "List roles", body = [Role]))
)]
pub async fn list_roles(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Role>>> {
    require_permission(&state, &auth, Permission::ViewRoles).await?;

    let db_roles = sqlx::query_as::<_, DbRole>(
        "SELECT id, org_id, name, description, scope, color, is_system, created_at, updated_at \
         FROM roles WHERE org_id = ? ORDER BY name",
    )
    .bind(auth.org_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let mut roles = Vec::with_capacity(db_roles.len());
    for db_role in db_roles {
        let permissions = role_permissions(&state.pool, &db_role.id).await?;
        let user_count = assigned_user_count(&state.pool, &db_role.id).await?;
        roles.push(db_role.into_role(permissions, user_count)?);
    }

    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    security(("bearerAuth" = [])),
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Blank name or unknown permission"),
        (status = 409, description = "Role name already exists")
    )
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    require_permission(&state, &auth, Permission::ManageRoles).await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::validation("role name must not be blank"));
    }
    let permissions = validate_permissions(&payload.permissions)?;
    ensure_name_available(&state.pool, auth.org_id, payload.name.trim(), None).await?;

    let role_id = Uuid::new_v4();
    let now = utc_now();
    let color = payload.color.clone().unwrap_or_else(|| "#6b7280".to_string());

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO roles (id, org_id, name, description, scope, color, is_system, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(role_id.to_string())
    .bind(auth.org_id.to_string())
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.scope.as_str())
    .bind(&color)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for permission in &permissions {
        sqlx::query("INSERT INTO role_permissions (role_id, permission, created_at) VALUES (?, ?, ?)")
            .bind(role_id.to_string())
            .bind(permission.full_name())
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let role = load_role(&state.pool, auth.org_id, role_id).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/roles/{id}",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    responses((status = 200, description = "Role detail", body = Role))
)]
pub async fn get_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    require_permission(&state, &auth, Permission::ViewRoles).await?;
    let role = load_role(&state.pool, auth.org_id, id).await?;
    Ok(Json(role))
}

#[utoipa::path(
    put,
    path = "/roles/{id}",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 403, description = "System roles cannot be edited")
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    require_permission(&state, &auth, Permission::ManageRoles).await?;

    let db_role = fetch_role(&state.pool, auth.org_id, id).await?;
    if db_role.is_system {
        return Err(AppError::forbidden("system roles cannot be edited"));
    }

    let name = match payload.name.as_deref() {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::validation("role name must not be blank"))
        }
        Some(name) => {
            ensure_name_available(&state.pool, auth.org_id, name.trim(), Some(id)).await?;
            name.trim().to_string()
        }
        None => db_role.name.clone(),
    };
    let permissions = match payload.permissions.as_deref() {
        Some(names) => Some(validate_permissions(names)?),
        None => None,
    };

    let description = payload.description.clone().or(db_role.description.clone());
    let color = payload.color.clone().unwrap_or_else(|| db_role.color.clone());
    let now = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE roles SET name = ?, description = ?, color = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(&color)
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    if let Some(permissions) = permissions {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        for permission in &permissions {
            sqlx::query("INSERT INTO role_permissions (role_id, permission, created_at) VALUES (?, ?, ?)")
                .bind(id.to_string())
                .bind(permission.full_name())
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;

    let role = load_role(&state.pool, auth.org_id, id).await?;
    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "System roles cannot be deleted"),
        (status = 409, description = "Role still has assigned users or workflow levels")
    )
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&state, &auth, Permission::ManageRoles).await?;

    let db_role = fetch_role(&state.pool, auth.org_id, id).await?;
    if db_role.is_system {
        return Err(AppError::forbidden("system roles cannot be deleted"));
    }

    let user_count = assigned_user_count(&state.pool, &db_role.id).await?;
    if user_count > 0 {
        return Err(AppError::conflict(format!(
            "role is still assigned to {} user(s)",
            user_count
        )));
    }
    let level_count = workflow_level_count(&state.pool, &db_role.id).await?;
    if level_count > 0 {
        return Err(AppError::conflict(format!(
            "role is still bound to {} workflow level(s)",
            level_count
        )));
    }

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/roles/{id}/clone",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = RoleCloneRequest,
    responses((status = 201, description = "Role cloned", body = Role))
)]
pub async fn clone_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleCloneRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    require_permission(&state, &auth, Permission::ManageRoles).await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::validation("role name must not be blank"));
    }
    let source = fetch_role(&state.pool, auth.org_id, id).await?;
    ensure_name_available(&state.pool, auth.org_id, payload.name.trim(), None).await?;

    let clone_id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;

    // Deep copy: same scope/color/permissions, never a system role.
    sqlx::query(
        "INSERT INTO roles (id, org_id, name, description, scope, color, is_system, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(clone_id.to_string())
    .bind(auth.org_id.to_string())
    .bind(payload.name.trim())
    .bind(&source.description)
    .bind(&source.scope)
    .bind(&source.color)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission, created_at) \
         SELECT ?, permission, ? FROM role_permissions WHERE role_id = ?",
    )
    .bind(clone_id.to_string())
    .bind(now)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let role = load_role(&state.pool, auth.org_id, clone_id).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/permissions",
    tag = "Roles",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Permission catalog grouped by category", body = [PermissionGroup]))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<PermissionGroup>>> {
    require_permission(&state, &auth, Permission::ViewRoles).await?;

    let mut groups: Vec<PermissionGroup> = Vec::new();
    for permission in Permission::ALL {
        let category = permission.category().as_str();
        let info = PermissionInfo {
            full_name: permission.full_name().to_string(),
            description: permission.description().to_string(),
        };
        match groups.iter_mut().find(|g| g.category == category) {
            Some(group) => group.permissions.push(info),
            None => groups.push(PermissionGroup {
                category: category.to_string(),
                permissions: vec![info],
            }),
        }
    }

    Ok(Json(groups))
}

fn validate_permissions(names: &[String]) -> AppResult<Vec<Permission>> {
    names
        .iter()
        .map(|name| {
            Permission::parse(name)
                .ok_or_else(|| AppError::validation(format!("unknown permission: {}", name)))
        })
        .collect()
}

async fn ensure_name_available(
    pool: &SqlitePool,
    org_id: Uuid,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM roles WHERE org_id = ? AND name = ? AND id != ?",
    )
    .bind(org_id.to_string())
    .bind(name)
    .bind(exclude.map(|id| id.to_string()).unwrap_or_default())
    .fetch_one(pool)
    .await?;

    if count > 0 {
        return Err(AppError::conflict("role name already exists"));
    }

    Ok(())
}

pub(crate) async fn fetch_role(pool: &SqlitePool, org_id: Uuid, role_id: Uuid) -> AppResult<DbRole> {
    sqlx::query_as::<_, DbRole>(
        "SELECT id, org_id, name, description, scope, color, is_system, created_at, updated_at \
         FROM roles WHERE id = ? AND org_id = ?",
    )
    .bind(role_id.to_string())
    .bind(org_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("role not found"))
}

async fn load_role(pool: &SqlitePool, org_id: Uuid, role_id: Uuid) -> AppResult<Role> {
    let db_role = fetch_role(pool, org_id, role_id).await?;
    let permissions = role_permissions(pool, &db_role.id).await?;
    let user_count = assigned_user_count(pool, &db_role.id).await?;
    db_role.into_role(permissions, user_count)
}

async fn role_permissions(pool: &SqlitePool, role_id: &str) -> AppResult<Vec<String>> {
    let permissions: Vec<String> = sqlx::query_scalar(
        "SELECT permission FROM role_permissions WHERE role_id = ? ORDER BY permission",
    )
    .bind(role_id)
    .fetch_all(pool)
    .await?;
    Ok(permissions)
}

async fn assigned_user_count(pool: &SqlitePool, role_id: &str) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT user_id) FROM role_assignments WHERE role_id = ?",
    )
    .bind(role_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

async fn workflow_level_count(pool: &SqlitePool, role_id: &str) -> AppResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM workflow_levels WHERE role_id = ?")
            .bind(role_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}
