use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Permission;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::site::{
    Area, AreaCreateRequest, AreaUpdateRequest, DbArea, DbSite, Site, SiteCreateRequest,
    SiteUpdateRequest,
};
use crate::routes::require_permission;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/sites",
    tag = "Sites",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "List sites", body = [Site]))
)]
pub async fn list_sites(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Site>>> {
    require_permission(&state, &auth, Permission::ViewSites).await?;

    let db_sites = sqlx::query_as::<_, DbSite>(
        "SELECT id, org_id, name, description, address, is_active, created_at, updated_at \
         FROM sites WHERE org_id = ? ORDER BY name",
    )
    .bind(auth.org_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let sites = db_sites
        .into_iter()
        .map(Site::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(sites))
}

#[utoipa::path(
    post,
    path = "/sites",
    tag = "Sites",
    security(("bearerAuth" = [])),
    request_body = SiteCreateRequest,
    responses((status = 201, description = "Site created", body = Site))
)]
pub async fn create_site(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SiteCreateRequest>,
) -> AppResult<(StatusCode, Json<Site>)> {
    require_permission(&state, &auth, Permission::ManageSites).await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::validation("site name must not be blank"));
    }

    let site_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO sites (id, org_id, name, description, address, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(site_id.to_string())
    .bind(auth.org_id.to_string())
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(&payload.address)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let site: Site = fetch_site(&state.pool, auth.org_id, site_id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(site)))
}

#[utoipa::path(
    put,
    path = "/sites/{id}",
    tag = "Sites",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Site id")),
    request_body = SiteUpdateRequest,
    responses((status = 200, description = "Site updated", body = Site))
)]
pub async fn update_site(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SiteUpdateRequest>,
) -> AppResult<Json<Site>> {
    require_permission(&state, &auth, Permission::ManageSites).await?;

    let current = fetch_site(&state.pool, auth.org_id, id).await?;

    let name = match payload.name.as_deref() {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::validation("site name must not be blank"))
        }
        Some(name) => name.trim().to_string(),
        None => current.name.clone(),
    };
    let description = payload.description.clone().or(current.description.clone());
    let address = payload.address.clone().or(current.address.clone());
    let is_active = payload.is_active.unwrap_or(current.is_active);
    let now = utc_now();

    sqlx::query(
        "UPDATE sites SET name = ?, description = ?, address = ?, is_active = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&description)
    .bind(&address)
    .bind(is_active)
    .bind(now)
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let site: Site = fetch_site(&state.pool, auth.org_id, id).await?.try_into()?;
    Ok(Json(site))
}

#[utoipa::path(
    delete,
    path = "/sites/{id}",
    tag = "Sites",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Site id")),
    responses(
        (status = 204, description = "Site and its areas deleted"),
        (status = 409, description = "Site still has requests")
    )
)]
pub async fn delete_site(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&state, &auth, Permission::ManageSites).await?;
    fetch_site(&state.pool, auth.org_id, id).await?;

    let request_count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM requests WHERE site_id = ?")
            .bind(id.to_string())
            .fetch_one(&state.pool)
            .await?;
    if request_count > 0 {
        return Err(AppError::conflict(format!(
            "site still has {} request(s)",
            request_count
        )));
    }

    // Areas go with the site via FK cascade.
    sqlx::query("DELETE FROM sites WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/sites/{id}/areas",
    tag = "Sites",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Site id")),
    responses((status = 200, description = "Areas of the site", body = [Area]))
)]
pub async fn list_areas(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Area>>> {
    require_permission(&state, &auth, Permission::ViewSites).await?;
    fetch_site(&state.pool, auth.org_id, id).await?;

    let db_areas = sqlx::query_as::<_, DbArea>(
        "SELECT id, site_id, name, description, is_active, created_at, updated_at \
         FROM areas WHERE site_id = ? ORDER BY name",
    )
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let areas = db_areas
        .into_iter()
        .map(Area::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(areas))
}

#[utoipa::path(
    post,
    path = "/sites/{id}/areas",
    tag = "Sites",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Site id")),
    request_body = AreaCreateRequest,
    responses((status = 201, description = "Area created", body = Area))
)]
pub async fn create_area(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AreaCreateRequest>,
) -> AppResult<(StatusCode, Json<Area>)> {
    require_permission(&state, &auth, Permission::ManageSites).await?;
    fetch_site(&state.pool, auth.org_id, id).await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::validation("area name must not be blank"));
    }

    let area_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO areas (id, site_id, name, description, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(area_id.to_string())
    .bind(id.to_string())
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let area: Area = fetch_area(&state.pool, auth.org_id, area_id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(area)))
}

#[utoipa::path(
    put,
    path = "/areas/{id}",
    tag = "Sites",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Area id")),
    request_body = AreaUpdateRequest,
    responses((status = 200, description = "Area updated", body = Area))
)]
pub async fn update_area(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AreaUpdateRequest>,
) -> AppResult<Json<Area>> {
    require_permission(&state, &auth, Permission::ManageSites).await?;

    let current = fetch_area(&state.pool, auth.org_id, id).await?;

    let name = match payload.name.as_deref() {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::validation("area name must not be blank"))
        }
        Some(name) => name.trim().to_string(),
        None => current.name.clone(),
    };
    let description = payload.description.clone().or(current.description.clone());
    let is_active = payload.is_active.unwrap_or(current.is_active);
    let now = utc_now();

    sqlx::query("UPDATE areas SET name = ?, description = ?, is_active = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(is_active)
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    let area: Area = fetch_area(&state.pool, auth.org_id, id).await?.try_into()?;
    Ok(Json(area))
}

#[utoipa::path(
    delete,
    path = "/areas/{id}",
    tag = "Sites",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Area id")),
    responses(
        (status = 204, description = "Area deleted"),
        (status = 409, description = "Area still has requests")
    )
)]
pub async fn delete_area(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&state, &auth, Permission::ManageSites).await?;
    fetch_area(&state.pool, auth.org_id, id).await?;

    let request_count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM requests WHERE area_id = ?")
            .bind(id.to_string())
            .fetch_one(&state.pool)
            .await?;
    if request_count > 0 {
        return Err(AppError::conflict(format!(
            "area still has {} request(s)",
            request_count
        )));
    }

    sqlx::query("DELETE FROM areas WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_site(pool: &SqlitePool, org_id: Uuid, site_id: Uuid) -> AppResult<DbSite> {
    sqlx::query_as::<_, DbSite>(
        "SELECT id, org_id, name, description, address, is_active, created_at, updated_at \
         FROM sites WHERE id = ? AND org_id = ?",
    )
    .bind(site_id.to_string())
    .bind(org_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("site not found"))
}

pub(crate) async fn fetch_area(pool: &SqlitePool, org_id: Uuid, area_id: Uuid) -> AppResult<DbArea> {
    sqlx::query_as::<_, DbArea>(
        "SELECT a.id, a.site_id, a.name, a.description, a.is_active, a.created_at, a.updated_at \
         FROM areas a JOIN sites s ON s.id = a.site_id WHERE a.id = ? AND s.org_id = ?",
    )
    .bind(area_id.to_string())
    .bind(org_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("area not found"))
}
