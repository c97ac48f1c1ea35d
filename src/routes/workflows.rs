use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Permission;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::workflow::{
    ApprovalLevel, ApprovalWorkflow, DbWorkflow, LevelInput, WorkflowCreateRequest,
    WorkflowDuplicateRequest, WorkflowUpdateRequest,
};
use crate::routes::require_permission;
use crate::utils::{parse_uuid, utc_now};
use crate::workflow::TRIGGER_REQUEST_SUBMITTED;

#[utoipa::path(
    get,
    path = "/workflows",
    tag = "Workflows",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "List workflows with their levels", body = [ApprovalWorkflow]))
)]
pub async fn list_workflows(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<ApprovalWorkflow>>> {
    require_permission(&state, &auth, Permission::ViewWorkflows).await?;

    let db_workflows = sqlx::query_as::<_, DbWorkflow>(
        "SELECT id, org_id, name, description, trigger_type, is_default, is_active, version, created_at, updated_at \
         FROM workflows WHERE org_id = ? ORDER BY name",
    )
    .bind(auth.org_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let mut workflows = Vec::with_capacity(db_workflows.len());
    for db_workflow in db_workflows {
        let levels = fetch_levels(&state.pool, &db_workflow.id).await?;
        workflows.push(db_workflow.into_workflow(levels)?);
    }

    Ok(Json(workflows))
}

#[utoipa::path(
    post,
    path = "/workflows",
    tag = "Workflows",
    security(("bearerAuth" = [])),
    request_body = WorkflowCreateRequest,
    responses(
        (status = 201, description = "Workflow created (inactive)", body = ApprovalWorkflow),
        (status = 400, description = "Blank name, empty levels, or unknown role")
    )
)]
pub async fn create_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<WorkflowCreateRequest>,
) -> AppResult<(StatusCode, Json<ApprovalWorkflow>)> {
    require_permission(&state, &auth, Permission::ManageWorkflows).await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::validation("workflow name must not be blank"));
    }
    validate_levels(&state.pool, auth.org_id, &payload.levels).await?;

    let workflow_id = Uuid::new_v4();
    let now = utc_now();
    let trigger_type = payload
        .trigger_type
        .clone()
        .unwrap_or_else(|| TRIGGER_REQUEST_SUBMITTED.to_string());

    let mut tx = state.pool.begin().await?;

    // New workflows start inactive; activation is an explicit step so the
    // one-active-per-trigger invariant has a single enforcement point.
    sqlx::query(
        "INSERT INTO workflows (id, org_id, name, description, trigger_type, is_default, is_active, version, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 0, 0, 1, ?, ?)",
    )
    .bind(workflow_id.to_string())
    .bind(auth.org_id.to_string())
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(&trigger_type)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    insert_levels(&mut tx, workflow_id, &payload.levels).await?;

    tx.commit().await?;

    let workflow = load_workflow(&state.pool, auth.org_id, workflow_id).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

#[utoipa::path(
    get,
    path = "/workflows/{id}",
    tag = "Workflows",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Workflow id")),
    responses((status = 200, description = "Workflow detail", body = ApprovalWorkflow))
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApprovalWorkflow>> {
    require_permission(&state, &auth, Permission::ViewWorkflows).await?;
    let workflow = load_workflow(&state.pool, auth.org_id, id).await?;
    Ok(Json(workflow))
}

#[utoipa::path(
    put,
    path = "/workflows/{id}",
    tag = "Workflows",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Workflow id")),
    request_body = WorkflowUpdateRequest,
    responses(
        (status = 200, description = "Workflow updated, version bumped", body = ApprovalWorkflow),
        (status = 403, description = "Default workflows cannot be edited")
    )
)]
pub async fn update_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkflowUpdateRequest>,
) -> AppResult<Json<ApprovalWorkflow>> {
    require_permission(&state, &auth, Permission::ManageWorkflows).await?;

    let current = fetch_workflow(&state.pool, auth.org_id, id).await?;
    if current.is_default {
        return Err(AppError::forbidden("the default workflow cannot be edited"));
    }

    let name = match payload.name.as_deref() {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::validation("workflow name must not be blank"))
        }
        Some(name) => name.trim().to_string(),
        None => current.name.clone(),
    };
    if let Some(levels) = payload.levels.as_deref() {
        validate_levels(&state.pool, auth.org_id, levels).await?;
    }
    let description = payload.description.clone().or(current.description.clone());
    let now = utc_now();

    let mut tx = state.pool.begin().await?;

    // Template edits bump the version; snapshots on in-flight requests are
    // untouched.
    sqlx::query(
        "UPDATE workflows SET name = ?, description = ?, version = version + 1, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&description)
    .bind(now)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    if let Some(levels) = payload.levels.as_deref() {
        sqlx::query("DELETE FROM workflow_levels WHERE workflow_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        insert_levels(&mut tx, id, levels).await?;
    }

    tx.commit().await?;

    let workflow = load_workflow(&state.pool, auth.org_id, id).await?;
    Ok(Json(workflow))
}

#[utoipa::path(
    patch,
    path = "/workflows/{id}/activate",
    tag = "Workflows",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Workflow id")),
    responses((status = 200, description = "Workflow activated; trigger siblings deactivated", body = ApprovalWorkflow))
)]
pub async fn activate_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApprovalWorkflow>> {
    require_permission(&state, &auth, Permission::ManageWorkflows).await?;

    let current = fetch_workflow(&state.pool, auth.org_id, id).await?;
    let now = utc_now();

    let mut tx = state.pool.begin().await?;

    // Deactivate-then-activate in one transaction keeps exactly one active
    // workflow per trigger type.
    sqlx::query("UPDATE workflows SET is_active = 0, updated_at = ? WHERE org_id = ? AND trigger_type = ? AND is_active = 1")
        .bind(now)
        .bind(auth.org_id.to_string())
        .bind(&current.trigger_type)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE workflows SET is_active = 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let workflow = load_workflow(&state.pool, auth.org_id, id).await?;
    Ok(Json(workflow))
}

#[utoipa::path(
    post,
    path = "/workflows/{id}/duplicate",
    tag = "Workflows",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Workflow id")),
    request_body = WorkflowDuplicateRequest,
    responses((status = 201, description = "Workflow duplicated (inactive, non-default)", body = ApprovalWorkflow))
)]
pub async fn duplicate_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkflowDuplicateRequest>,
) -> AppResult<(StatusCode, Json<ApprovalWorkflow>)> {
    require_permission(&state, &auth, Permission::ManageWorkflows).await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::validation("workflow name must not be blank"));
    }
    let source = fetch_workflow(&state.pool, auth.org_id, id).await?;

    let copy_id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO workflows (id, org_id, name, description, trigger_type, is_default, is_active, version, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 0, 0, 1, ?, ?)",
    )
    .bind(copy_id.to_string())
    .bind(auth.org_id.to_string())
    .bind(payload.name.trim())
    .bind(&source.description)
    .bind(&source.trigger_type)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO workflow_levels (workflow_id, level_order, role_id) \
         SELECT ?, level_order, role_id FROM workflow_levels WHERE workflow_id = ?",
    )
    .bind(copy_id.to_string())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let workflow = load_workflow(&state.pool, auth.org_id, copy_id).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

#[utoipa::path(
    delete,
    path = "/workflows/{id}",
    tag = "Workflows",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Workflow id")),
    responses(
        (status = 204, description = "Workflow deleted"),
        (status = 403, description = "Default workflows cannot be deleted"),
        (status = 409, description = "Workflow still has requests")
    )
)]
pub async fn delete_workflow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&state, &auth, Permission::ManageWorkflows).await?;

    let current = fetch_workflow(&state.pool, auth.org_id, id).await?;
    if current.is_default {
        return Err(AppError::forbidden("the default workflow cannot be deleted"));
    }

    let request_count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM requests WHERE workflow_id = ?")
            .bind(id.to_string())
            .fetch_one(&state.pool)
            .await?;
    if request_count > 0 {
        return Err(AppError::conflict(format!(
            "workflow still has {} request(s)",
            request_count
        )));
    }

    sqlx::query("DELETE FROM workflows WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn validate_levels(pool: &SqlitePool, org_id: Uuid, levels: &[LevelInput]) -> AppResult<()> {
    if levels.is_empty() {
        return Err(AppError::validation("a workflow needs at least one level"));
    }
    for level in levels {
        crate::routes::roles::fetch_role(pool, org_id, level.role_id)
            .await
            .map_err(|_| AppError::validation("level role does not exist in this organization"))?;
    }
    Ok(())
}

async fn insert_levels(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    workflow_id: Uuid,
    levels: &[LevelInput],
) -> AppResult<()> {
    // Level order is assigned from array position, 1-based and contiguous.
    for (index, level) in levels.iter().enumerate() {
        sqlx::query("INSERT INTO workflow_levels (workflow_id, level_order, role_id) VALUES (?, ?, ?)")
            .bind(workflow_id.to_string())
            .bind((index + 1) as i64)
            .bind(level.role_id.to_string())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

pub(crate) async fn fetch_workflow(pool: &SqlitePool, org_id: Uuid, workflow_id: Uuid) -> AppResult<DbWorkflow> {
    sqlx::query_as::<_, DbWorkflow>(
        "SELECT id, org_id, name, description, trigger_type, is_default, is_active, version, created_at, updated_at \
         FROM workflows WHERE id = ? AND org_id = ?",
    )
    .bind(workflow_id.to_string())
    .bind(org_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("workflow not found"))
}

pub(crate) async fn fetch_levels(pool: &SqlitePool, workflow_id: &str) -> AppResult<Vec<ApprovalLevel>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT level_order, role_id FROM workflow_levels WHERE workflow_id = ? ORDER BY level_order",
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(level_order, role_id)| {
            Ok(ApprovalLevel {
                level_order,
                role_id: parse_uuid(&role_id, "role")?,
            })
        })
        .collect()
}

async fn load_workflow(pool: &SqlitePool, org_id: Uuid, workflow_id: Uuid) -> AppResult<ApprovalWorkflow> {
    let db_workflow = fetch_workflow(pool, org_id, workflow_id).await?;
    let levels = fetch_levels(pool, &db_workflow.id).await?;
    db_workflow.into_workflow(levels)
}
