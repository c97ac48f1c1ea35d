use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Permission;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::catalog::{
    CatalogItem, CatalogItemCreateRequest, CatalogItemUpdateRequest, Category,
    CategoryCreateRequest, DbCatalogItem, DbCategory,
};
use crate::routes::require_permission;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/categories",
    tag = "Catalog",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "List categories", body = [Category]))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Category>>> {
    require_permission(&state, &auth, Permission::ViewItems).await?;

    let db_categories = sqlx::query_as::<_, DbCategory>(
        "SELECT id, org_id, name, description, created_at FROM categories WHERE org_id = ? ORDER BY name",
    )
    .bind(auth.org_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let categories = db_categories
        .into_iter()
        .map(Category::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(categories))
}

#[utoipa::path(
    post,
    path = "/categories",
    tag = "Catalog",
    security(("bearerAuth" = [])),
    request_body = CategoryCreateRequest,
    responses((status = 201, description = "Category created", body = Category))
)]
pub async fn create_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CategoryCreateRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    require_permission(&state, &auth, Permission::ManageCategories).await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::validation("category name must not be blank"));
    }

    let category_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query("INSERT INTO categories (id, org_id, name, description, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(category_id.to_string())
        .bind(auth.org_id.to_string())
        .bind(payload.name.trim())
        .bind(&payload.description)
        .bind(now)
        .execute(&state.pool)
        .await?;

    let category: Category = fetch_category(&state.pool, auth.org_id, category_id)
        .await?
        .try_into()?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(
    delete,
    path = "/categories/{id}",
    tag = "Catalog",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Category id")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 409, description = "Category still has items")
    )
)]
pub async fn delete_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&state, &auth, Permission::ManageCategories).await?;
    fetch_category(&state.pool, auth.org_id, id).await?;

    let item_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM catalog_items WHERE category_id = ?")
        .bind(id.to_string())
        .fetch_one(&state.pool)
        .await?;
    if item_count > 0 {
        return Err(AppError::conflict(format!(
            "category still has {} item(s)",
            item_count
        )));
    }

    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/items",
    tag = "Catalog",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "List catalog items", body = [CatalogItem]))
)]
pub async fn list_items(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<CatalogItem>>> {
    require_permission(&state, &auth, Permission::ViewItems).await?;

    let db_items = sqlx::query_as::<_, DbCatalogItem>(
        "SELECT id, org_id, category_id, name, description, unit, cost_per_unit, is_active, created_at, updated_at \
         FROM catalog_items WHERE org_id = ? ORDER BY name",
    )
    .bind(auth.org_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let items = db_items
        .into_iter()
        .map(CatalogItem::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(items))
}

#[utoipa::path(
    post,
    path = "/items",
    tag = "Catalog",
    security(("bearerAuth" = [])),
    request_body = CatalogItemCreateRequest,
    responses((status = 201, description = "Catalog item created", body = CatalogItem))
)]
pub async fn create_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CatalogItemCreateRequest>,
) -> AppResult<(StatusCode, Json<CatalogItem>)> {
    require_permission(&state, &auth, Permission::ManageItems).await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::validation("item name must not be blank"));
    }
    if payload.cost_per_unit.is_some_and(|c| !c.is_finite() || c < 0.0) {
        return Err(AppError::validation("cost_per_unit must be a non-negative number"));
    }
    fetch_category(&state.pool, auth.org_id, payload.category_id).await?;

    let item_id = Uuid::new_v4();
    let now = utc_now();
    let unit = payload.unit.clone().unwrap_or_else(|| "unit".to_string());

    sqlx::query(
        "INSERT INTO catalog_items (id, org_id, category_id, name, description, unit, cost_per_unit, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(item_id.to_string())
    .bind(auth.org_id.to_string())
    .bind(payload.category_id.to_string())
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(&unit)
    .bind(payload.cost_per_unit)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let item: CatalogItem = fetch_item(&state.pool, auth.org_id, item_id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[utoipa::path(
    put,
    path = "/items/{id}",
    tag = "Catalog",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Item id")),
    request_body = CatalogItemUpdateRequest,
    responses((status = 200, description = "Catalog item updated", body = CatalogItem))
)]
pub async fn update_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CatalogItemUpdateRequest>,
) -> AppResult<Json<CatalogItem>> {
    require_permission(&state, &auth, Permission::ManageItems).await?;

    let current = fetch_item(&state.pool, auth.org_id, id).await?;

    let category_id = match payload.category_id {
        Some(category_id) => {
            fetch_category(&state.pool, auth.org_id, category_id).await?;
            category_id.to_string()
        }
        None => current.category_id.clone(),
    };
    let name = match payload.name.as_deref() {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::validation("item name must not be blank"))
        }
        Some(name) => name.trim().to_string(),
        None => current.name.clone(),
    };
    if payload.cost_per_unit.is_some_and(|c| !c.is_finite() || c < 0.0) {
        return Err(AppError::validation("cost_per_unit must be a non-negative number"));
    }
    let description = payload.description.clone().or(current.description.clone());
    let unit = payload.unit.clone().unwrap_or_else(|| current.unit.clone());
    let cost_per_unit = payload.cost_per_unit.or(current.cost_per_unit);
    let is_active = payload.is_active.unwrap_or(current.is_active);
    let now = utc_now();

    sqlx::query(
        "UPDATE catalog_items SET category_id = ?, name = ?, description = ?, unit = ?, cost_per_unit = ?, is_active = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&category_id)
    .bind(&name)
    .bind(&description)
    .bind(&unit)
    .bind(cost_per_unit)
    .bind(is_active)
    .bind(now)
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let item: CatalogItem = fetch_item(&state.pool, auth.org_id, id).await?.try_into()?;
    Ok(Json(item))
}

#[utoipa::path(
    delete,
    path = "/items/{id}",
    tag = "Catalog",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Item id")),
    responses(
        (status = 204, description = "Catalog item deleted"),
        (status = 409, description = "Item is referenced by requests")
    )
)]
pub async fn delete_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&state, &auth, Permission::ManageItems).await?;
    fetch_item(&state.pool, auth.org_id, id).await?;

    // Request snapshots keep a FK to the catalog row.
    let reference_count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM request_items WHERE catalog_item_id = ?")
            .bind(id.to_string())
            .fetch_one(&state.pool)
            .await?;
    if reference_count > 0 {
        return Err(AppError::conflict(format!(
            "item is referenced by {} request item(s)",
            reference_count
        )));
    }

    sqlx::query("DELETE FROM catalog_items WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_category(pool: &SqlitePool, org_id: Uuid, category_id: Uuid) -> AppResult<DbCategory> {
    sqlx::query_as::<_, DbCategory>(
        "SELECT id, org_id, name, description, created_at FROM categories WHERE id = ? AND org_id = ?",
    )
    .bind(category_id.to_string())
    .bind(org_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("category not found"))
}

pub(crate) async fn fetch_item(pool: &SqlitePool, org_id: Uuid, item_id: Uuid) -> AppResult<DbCatalogItem> {
    sqlx::query_as::<_, DbCatalogItem>(
        "SELECT id, org_id, category_id, name, description, unit, cost_per_unit, is_active, created_at, updated_at \
         FROM catalog_items WHERE id = ? AND org_id = ?",
    )
    .bind(item_id.to_string())
    .bind(org_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("catalog item not found"))
}
