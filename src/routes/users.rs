use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::matrix::{AssignmentMatrix, SiteAreas};
use crate::authz::{LocationKey, Permission};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::catalog::{Category, DbCategory};
use crate::models::site::{Area, DbArea, DbSite, Site};
use crate::models::user::{
    DbUser, ReplaceAccessRequest, ReplaceAssignmentsRequest, RoleAssignmentEntry, User,
    UserCreateRequest, UserDetail, UserUpdateRequest,
};
use crate::routes::require_permission;
use crate::utils::{hash_password, parse_uuid, utc_now};

#[utoipa::path(
    get,
    path = "/end-users",
    tag = "End users",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "List end users", body = [User]))
)]
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<User>>> {
    require_permission(&state, &auth, Permission::ViewUsers).await?;

    let db_users = sqlx::query_as::<_, DbUser>(
        "SELECT id, org_id, username, email, password_hash, first_name, last_name, role_label, is_active, created_at, updated_at, last_login_at \
         FROM users WHERE org_id = ? ORDER BY last_name, first_name",
    )
    .bind(auth.org_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let users = db_users
        .into_iter()
        .map(User::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    post,
    path = "/end-users",
    tag = "End users",
    security(("bearerAuth" = [])),
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "End user created", body = User),
        (status = 409, description = "Username already in use")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    require_permission(&state, &auth, Permission::ManageUsers).await?;

    if payload.username.trim().is_empty() {
        return Err(AppError::validation("username must not be blank"));
    }
    crate::routes::auth::ensure_username_available(&state.pool, &payload.username).await?;

    let password_hash = hash_password(&payload.password)?;
    let user_id = Uuid::new_v4();
    let now = utc_now();
    let role_label = payload.role_label.clone().unwrap_or_else(|| "staff".to_string());

    sqlx::query(
        "INSERT INTO users (id, org_id, username, email, password_hash, first_name, last_name, role_label, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(auth.org_id.to_string())
    .bind(payload.username.trim())
    .bind(&payload.email)
    .bind(password_hash)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&role_label)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let user: User = fetch_org_user(&state.pool, auth.org_id, user_id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/end-users/{id}",
    tag = "End users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "End user with access grants", body = UserDetail))
)]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserDetail>> {
    require_permission(&state, &auth, Permission::ViewUsers).await?;

    let db_user = fetch_org_user(&state.pool, auth.org_id, id).await?;

    let db_sites = sqlx::query_as::<_, DbSite>(
        "SELECT s.id, s.org_id, s.name, s.description, s.address, s.is_active, s.created_at, s.updated_at \
         FROM sites s JOIN user_site_access a ON a.site_id = s.id WHERE a.user_id = ? ORDER BY s.name",
    )
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let db_areas = sqlx::query_as::<_, DbArea>(
        "SELECT ar.id, ar.site_id, ar.name, ar.description, ar.is_active, ar.created_at, ar.updated_at \
         FROM areas ar JOIN user_area_access a ON a.area_id = ar.id WHERE a.user_id = ? ORDER BY ar.name",
    )
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let db_categories = sqlx::query_as::<_, DbCategory>(
        "SELECT c.id, c.org_id, c.name, c.description, c.created_at \
         FROM categories c JOIN user_category_access a ON a.category_id = c.id WHERE a.user_id = ? ORDER BY c.name",
    )
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let detail = UserDetail {
        user: db_user.try_into()?,
        sites: db_sites.into_iter().map(Site::try_from).collect::<Result<_, _>>()?,
        areas: db_areas.into_iter().map(Area::try_from).collect::<Result<_, _>>()?,
        categories: db_categories
            .into_iter()
            .map(Category::try_from)
            .collect::<Result<_, _>>()?,
    };

    Ok(Json(detail))
}

#[utoipa::path(
    put,
    path = "/end-users/{id}",
    tag = "End users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses((status = 200, description = "End user updated", body = User))
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    require_permission(&state, &auth, Permission::ManageUsers).await?;

    let current = fetch_org_user(&state.pool, auth.org_id, id).await?;

    let email = payload.email.clone().or(current.email.clone());
    let first_name = payload.first_name.clone().unwrap_or_else(|| current.first_name.clone());
    let last_name = payload.last_name.clone().unwrap_or_else(|| current.last_name.clone());
    let role_label = payload.role_label.clone().unwrap_or_else(|| current.role_label.clone());
    let is_active = payload.is_active.unwrap_or(current.is_active);
    let now = utc_now();

    sqlx::query(
        "UPDATE users SET email = ?, first_name = ?, last_name = ?, role_label = ?, is_active = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&role_label)
    .bind(is_active)
    .bind(now)
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let user: User = fetch_org_user(&state.pool, auth.org_id, id).await?.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    get,
    path = "/end-users/{id}/roles",
    tag = "End users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "The user's role assignment triples", body = [RoleAssignmentEntry]))
)]
pub async fn list_user_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<RoleAssignmentEntry>>> {
    require_permission(&state, &auth, Permission::ViewUsers).await?;
    fetch_org_user(&state.pool, auth.org_id, id).await?;

    let entries = fetch_assignment_entries(&state.pool, id).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    post,
    path = "/end-users/{id}/roles",
    tag = "End users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = ReplaceAssignmentsRequest,
    responses(
        (status = 200, description = "Assignment set replaced", body = [RoleAssignmentEntry]),
        (status = 400, description = "Entry with both site and area, or unknown role")
    )
)]
pub async fn replace_user_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceAssignmentsRequest>,
) -> AppResult<Json<Vec<RoleAssignmentEntry>>> {
    require_permission(&state, &auth, Permission::ManageUsers).await?;
    fetch_org_user(&state.pool, auth.org_id, id).await?;

    for entry in &payload.assignments {
        if entry.site_id.is_some() && entry.area_id.is_some() {
            return Err(AppError::validation(
                "an assignment carries at most one of site_id and area_id",
            ));
        }
        crate::routes::roles::fetch_role(&state.pool, auth.org_id, entry.role_id).await?;
    }

    let sites = load_site_areas(&state.pool, auth.org_id).await?;

    // Normalize so stored triples always satisfy the cascade invariant,
    // whatever shape the client sent.
    let mut matrix = AssignmentMatrix::from_entries(payload.assignments.iter().map(|e| {
        (e.role_id, LocationKey::from_ids(e.site_id, e.area_id))
    }));
    matrix.normalize(&sites);

    let now = utc_now();
    let mut tx = state.pool.begin().await?;

    sqlx::query("DELETE FROM role_assignments WHERE user_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    for entry in matrix.flatten() {
        sqlx::query(
            "INSERT INTO role_assignments (id, user_id, role_id, site_id, area_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(id.to_string())
        .bind(entry.role_id.to_string())
        .bind(entry.site_id.map(|s| s.to_string()))
        .bind(entry.area_id.map(|a| a.to_string()))
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let entries = fetch_assignment_entries(&state.pool, id).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    put,
    path = "/end-users/{id}/access",
    tag = "End users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = ReplaceAccessRequest,
    responses((status = 200, description = "Access grants replaced"))
)]
pub async fn replace_user_access(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceAccessRequest>,
) -> AppResult<StatusCode> {
    require_permission(&state, &auth, Permission::ManageAccess).await?;
    fetch_org_user(&state.pool, auth.org_id, id).await?;

    let mut tx = state.pool.begin().await?;

    sqlx::query("DELETE FROM user_site_access WHERE user_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM user_area_access WHERE user_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM user_category_access WHERE user_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    for site_id in &payload.site_ids {
        sqlx::query("INSERT INTO user_site_access (user_id, site_id) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(site_id.to_string())
            .execute(&mut *tx)
            .await?;
    }
    for area_id in &payload.area_ids {
        sqlx::query("INSERT INTO user_area_access (user_id, area_id) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(area_id.to_string())
            .execute(&mut *tx)
            .await?;
    }
    for category_id in &payload.category_ids {
        sqlx::query("INSERT INTO user_category_access (user_id, category_id) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(category_id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(StatusCode::OK)
}

async fn fetch_org_user(pool: &SqlitePool, org_id: Uuid, user_id: Uuid) -> AppResult<DbUser> {
    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, org_id, username, email, password_hash, first_name, last_name, role_label, is_active, created_at, updated_at, last_login_at \
         FROM users WHERE id = ? AND org_id = ?",
    )
    .bind(user_id.to_string())
    .bind(org_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))?;

    Ok(db_user)
}

async fn fetch_assignment_entries(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<RoleAssignmentEntry>> {
    let rows: Vec<(String, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT role_id, site_id, area_id FROM role_assignments WHERE user_id = ? ORDER BY role_id, site_id, area_id",
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(role_id, site_id, area_id)| {
            Ok(RoleAssignmentEntry {
                role_id: parse_uuid(&role_id, "role")?,
                site_id: site_id.as_deref().map(|s| parse_uuid(s, "site")).transpose()?,
                area_id: area_id.as_deref().map(|a| parse_uuid(a, "area")).transpose()?,
            })
        })
        .collect()
}

async fn load_site_areas(pool: &SqlitePool, org_id: Uuid) -> AppResult<Vec<SiteAreas>> {
    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        "SELECT s.id, a.id FROM sites s LEFT JOIN areas a ON a.site_id = s.id WHERE s.org_id = ? ORDER BY s.id",
    )
    .bind(org_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut sites: Vec<SiteAreas> = Vec::new();
    for (site_id, area_id) in rows {
        let site_id = parse_uuid(&site_id, "site")?;
        let area_id = area_id.as_deref().map(|a| parse_uuid(a, "area")).transpose()?;
        match sites.iter_mut().find(|s| s.site_id == site_id) {
            Some(site) => {
                if let Some(area_id) = area_id {
                    site.area_ids.push(area_id);
                }
            }
            None => sites.push(SiteAreas {
                site_id,
                area_ids: area_id.into_iter().collect(),
            }),
        }
    }

    Ok(sites)
}
