use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{load_principal, DefaultPolicyEvaluator, Permission, PolicyEvaluator, Principal};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::request::{
    ApprovalLevelInstance, ApproveBody, DbApprovalLevel, DbRequest, PurchaseRequest, RejectBody,
    RequestCreateRequest, RequestItem,
};
use crate::utils::{parse_uuid, utc_now};
use crate::workflow::engine::{self, ApprovalOutcome, LevelState, LevelTemplate};
use crate::workflow::{LevelStatus, RequestStatus, TRIGGER_REQUEST_SUBMITTED};

#[utoipa::path(
    get,
    path = "/requests",
    tag = "Requests",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Requests visible to the caller", body = [PurchaseRequest]))
)]
pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<PurchaseRequest>>> {
    let principal = load_principal(&state.pool, &auth).await;

    let db_requests = sqlx::query_as::<_, DbRequest>(
        "SELECT id, org_id, requester_id, site_id, area_id, workflow_id, status, priority, notes, created_at, updated_at, approved_at, rejected_at, fulfilled_at \
         FROM requests WHERE org_id = ? ORDER BY created_at DESC",
    )
    .bind(auth.org_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let mut requests = Vec::new();
    for db_request in db_requests {
        if !can_view(&principal, &auth, &db_request)? {
            continue;
        }
        requests.push(load_detail(&state.pool, db_request).await?);
    }

    Ok(Json(requests))
}

#[utoipa::path(
    post,
    path = "/requests",
    tag = "Requests",
    security(("bearerAuth" = [])),
    request_body = RequestCreateRequest,
    responses(
        (status = 201, description = "Request submitted with its approval chain", body = PurchaseRequest),
        (status = 400, description = "Empty items or bad quantity"),
        (status = 403, description = "No create permission at the location")
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RequestCreateRequest>,
) -> AppResult<(StatusCode, Json<PurchaseRequest>)> {
    let principal = load_principal(&state.pool, &auth).await;
    let evaluator = DefaultPolicyEvaluator::new();

    if !evaluator
        .can_at(&principal, Permission::CreateRequests, payload.site_id, payload.area_id)
        .await
    {
        return Err(AppError::forbidden("missing permission requests.create_requests"));
    }

    crate::routes::sites::fetch_site(&state.pool, auth.org_id, payload.site_id).await?;
    if let Some(area_id) = payload.area_id {
        let area = crate::routes::sites::fetch_area(&state.pool, auth.org_id, area_id).await?;
        if area.site_id != payload.site_id.to_string() {
            return Err(AppError::validation("area does not belong to the site"));
        }
    }
    if payload.items.is_empty() {
        return Err(AppError::validation("a request needs at least one item"));
    }
    for item in &payload.items {
        if item.quantity <= 0 {
            return Err(AppError::validation("item quantity must be positive"));
        }
    }

    // Snapshot the active workflow for this trigger; template edits after
    // this point never touch the request's chain.
    let workflow = active_workflow(&state.pool, auth.org_id).await?;
    let templates = level_templates(&state.pool, &workflow).await?;
    let chain = engine::instantiate(&templates);

    let request_id = Uuid::new_v4();
    let now = utc_now();
    let priority = payload
        .priority
        .map(|p| p.as_str())
        .unwrap_or("medium");

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO requests (id, org_id, requester_id, site_id, area_id, workflow_id, status, priority, notes, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?)",
    )
    .bind(request_id.to_string())
    .bind(auth.org_id.to_string())
    .bind(auth.user_id.to_string())
    .bind(payload.site_id.to_string())
    .bind(payload.area_id.map(|a| a.to_string()))
    .bind(&workflow)
    .bind(priority)
    .bind(&payload.notes)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for input in &payload.items {
        // Item name and price are copied at submission time so later
        // catalog edits leave the request unchanged.
        let item = crate::routes::catalog::fetch_item(&state.pool, auth.org_id, input.catalog_item_id).await?;
        sqlx::query(
            "INSERT INTO request_items (id, request_id, catalog_item_id, name, quantity, notes, cost_per_unit) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(request_id.to_string())
        .bind(input.catalog_item_id.to_string())
        .bind(&item.name)
        .bind(input.quantity)
        .bind(&input.notes)
        .bind(item.cost_per_unit)
        .execute(&mut *tx)
        .await?;
    }

    for level in &chain {
        sqlx::query(
            "INSERT INTO request_approval_levels (id, request_id, level_order, role_id, status) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(request_id.to_string())
        .bind(level.level_order)
        .bind(level.role_id.to_string())
        .bind(level.status.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(request_id = %request_id, levels = chain.len(), "request submitted");

    let db_request = fetch_request(&state.pool, auth.org_id, request_id).await?;
    let request = load_detail(&state.pool, db_request).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/requests/{id}",
    tag = "Requests",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Request id")),
    responses((status = 200, description = "Request with items and approval chain", body = PurchaseRequest))
)]
pub async fn get_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseRequest>> {
    let principal = load_principal(&state.pool, &auth).await;
    let db_request = fetch_request(&state.pool, auth.org_id, id).await?;

    if !can_view(&principal, &auth, &db_request)? {
        return Err(AppError::forbidden("missing permission requests.view_requests"));
    }

    let request = load_detail(&state.pool, db_request).await?;
    Ok(Json(request))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/approve",
    tag = "Requests",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Request id")),
    request_body = ApproveBody,
    responses(
        (status = 200, description = "Pending level approved", body = PurchaseRequest),
        (status = 403, description = "No permission, wrong role, or own request"),
        (status = 409, description = "Level already resolved by a concurrent reviewer")
    )
)]
pub async fn approve_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproveBody>,
) -> AppResult<Json<PurchaseRequest>> {
    let db_request = fetch_request(&state.pool, auth.org_id, id).await?;
    let (site_id, area_id) = request_location(&db_request)?;

    ensure_overall_pending(&db_request)?;
    if db_request.requester_id == auth.user_id.to_string() {
        return Err(AppError::CannotApproveOwnRequest);
    }

    let principal = load_principal(&state.pool, &auth).await;
    let evaluator = DefaultPolicyEvaluator::new();
    if !evaluator
        .can_at(&principal, Permission::ApproveRequests, site_id, area_id)
        .await
    {
        return Err(AppError::forbidden("missing permission requests.approve_requests"));
    }

    let chain = level_states(&state.pool, &db_request.id).await?;
    let pending = engine::pending_level(&chain)
        .ok_or_else(|| AppError::invalid_request_status("no approval level is pending"))?;
    let level_order = pending.level_order;

    // Strict role binding: holding the permission is not enough, the
    // reviewer must hold the level's own role covering the location.
    if !principal.holds_role_covering(pending.role_id, site_id, area_id) {
        return Err(AppError::forbidden(
            "the pending level is bound to a role you do not hold here",
        ));
    }

    let outcome = engine::approve(&chain, level_order)?;
    let now = utc_now();

    let mut tx = state.pool.begin().await?;
    resolve_level(
        &mut tx,
        &db_request.id,
        level_order,
        LevelStatus::Approved,
        auth.user_id,
        now,
        payload.notes.as_deref(),
        None,
    )
    .await?;

    match outcome {
        ApprovalOutcome::Advanced { next_level } => {
            sqlx::query(
                "UPDATE request_approval_levels SET status = 'pending' WHERE request_id = ? AND level_order = ? AND status = 'awaiting'",
            )
            .bind(&db_request.id)
            .bind(next_level)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE requests SET updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(&db_request.id)
                .execute(&mut *tx)
                .await?;
        }
        ApprovalOutcome::Completed => {
            transition_request(&mut tx, &db_request.id, RequestStatus::Pending, RequestStatus::Approved, now).await?;
        }
    }

    tx.commit().await?;

    tracing::info!(request_id = %id, level = level_order, outcome = ?outcome, "level approved");

    let db_request = fetch_request(&state.pool, auth.org_id, id).await?;
    let request = load_detail(&state.pool, db_request).await?;
    Ok(Json(request))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/reject",
    tag = "Requests",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Request id")),
    request_body = RejectBody,
    responses(
        (status = 200, description = "Request rejected", body = PurchaseRequest),
        (status = 400, description = "Missing rejection reason")
    )
)]
pub async fn reject_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectBody>,
) -> AppResult<Json<PurchaseRequest>> {
    let db_request = fetch_request(&state.pool, auth.org_id, id).await?;
    let (site_id, area_id) = request_location(&db_request)?;

    ensure_overall_pending(&db_request)?;
    if db_request.requester_id == auth.user_id.to_string() {
        return Err(AppError::CannotApproveOwnRequest);
    }

    let principal = load_principal(&state.pool, &auth).await;
    let evaluator = DefaultPolicyEvaluator::new();
    if !evaluator
        .can_at(&principal, Permission::RejectRequests, site_id, area_id)
        .await
    {
        return Err(AppError::forbidden("missing permission requests.reject_requests"));
    }

    let chain = level_states(&state.pool, &db_request.id).await?;
    let pending = engine::pending_level(&chain)
        .ok_or_else(|| AppError::invalid_request_status("no approval level is pending"))?;
    let level_order = pending.level_order;

    if !principal.holds_role_covering(pending.role_id, site_id, area_id) {
        return Err(AppError::forbidden(
            "the pending level is bound to a role you do not hold here",
        ));
    }

    engine::reject(&chain, level_order, &payload.notes)?;
    let now = utc_now();

    let mut tx = state.pool.begin().await?;
    resolve_level(
        &mut tx,
        &db_request.id,
        level_order,
        LevelStatus::Rejected,
        auth.user_id,
        now,
        None,
        Some(payload.notes.trim()),
    )
    .await?;

    // Remaining levels stay awaiting; the overall status freezes the chain.
    transition_request(&mut tx, &db_request.id, RequestStatus::Pending, RequestStatus::Rejected, now).await?;

    tx.commit().await?;

    tracing::info!(request_id = %id, level = level_order, "request rejected");

    let db_request = fetch_request(&state.pool, auth.org_id, id).await?;
    let request = load_detail(&state.pool, db_request).await?;
    Ok(Json(request))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/fulfill",
    tag = "Requests",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request fulfilled", body = PurchaseRequest),
        (status = 409, description = "Request is not approved")
    )
)]
pub async fn fulfill_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseRequest>> {
    let db_request = fetch_request(&state.pool, auth.org_id, id).await?;
    let (site_id, area_id) = request_location(&db_request)?;

    let principal = load_principal(&state.pool, &auth).await;
    let evaluator = DefaultPolicyEvaluator::new();
    if !evaluator
        .can_at(&principal, Permission::FulfillRequests, site_id, area_id)
        .await
    {
        return Err(AppError::forbidden("missing permission requests.fulfill_requests"));
    }

    match db_request.status()? {
        RequestStatus::Approved => {}
        RequestStatus::Fulfilled => {
            return Err(AppError::already_processed("request was already fulfilled"))
        }
        status => {
            return Err(AppError::invalid_request_status(format!(
                "only approved requests can be fulfilled, this one is {}",
                status.as_str()
            )))
        }
    }

    let now = utc_now();
    let mut tx = state.pool.begin().await?;
    transition_request(&mut tx, &db_request.id, RequestStatus::Approved, RequestStatus::Fulfilled, now).await?;
    tx.commit().await?;

    tracing::info!(request_id = %id, "request fulfilled");

    let db_request = fetch_request(&state.pool, auth.org_id, id).await?;
    let request = load_detail(&state.pool, db_request).await?;
    Ok(Json(request))
}

fn can_view(principal: &Principal, auth: &AuthUser, db_request: &DbRequest) -> AppResult<bool> {
    if db_request.requester_id == auth.user_id.to_string() {
        return Ok(true);
    }
    let (site_id, area_id) = request_location(db_request)?;
    Ok(principal.is_super_admin()
        || principal
            .permissions_covering(site_id, area_id)
            .contains(&Permission::ViewRequests))
}

fn request_location(db_request: &DbRequest) -> AppResult<(Uuid, Option<Uuid>)> {
    let site_id = parse_uuid(&db_request.site_id, "site")?;
    let area_id = db_request
        .area_id
        .as_deref()
        .map(|a| parse_uuid(a, "area"))
        .transpose()?;
    Ok((site_id, area_id))
}

fn ensure_overall_pending(db_request: &DbRequest) -> AppResult<()> {
    match db_request.status()? {
        RequestStatus::Pending => Ok(()),
        RequestStatus::Approved | RequestStatus::Rejected | RequestStatus::Fulfilled => {
            Err(AppError::invalid_request_status(format!(
                "request is {}, no approval decision applies",
                db_request.status
            )))
        }
    }
}

/// Resolve the pending level with a status precondition. Zero rows means a
/// concurrent reviewer got there first.
#[allow(clippy::too_many_arguments)]
async fn resolve_level(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: &str,
    level_order: i64,
    to: LevelStatus,
    actor: Uuid,
    now: DateTime<Utc>,
    comments: Option<&str>,
    rejection_reason: Option<&str>,
) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE request_approval_levels \
         SET status = ?, approved_by = ?, approved_at = ?, comments = ?, rejection_reason = ? \
         WHERE request_id = ? AND level_order = ? AND status = 'pending'",
    )
    .bind(to.as_str())
    .bind(actor.to_string())
    .bind(now)
    .bind(comments)
    .bind(rejection_reason)
    .bind(request_id)
    .bind(level_order)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::already_processed(
            "the approval level was resolved concurrently",
        ));
    }

    Ok(())
}

/// Transition the overall request status with a precondition on the
/// expected current status.
async fn transition_request(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: &str,
    from: RequestStatus,
    to: RequestStatus,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let timestamp_column = match to {
        RequestStatus::Approved => "approved_at",
        RequestStatus::Rejected => "rejected_at",
        RequestStatus::Fulfilled => "fulfilled_at",
        RequestStatus::Pending => {
            return Err(AppError::internal("cannot transition a request back to pending"))
        }
    };

    let sql = format!(
        "UPDATE requests SET status = ?, {} = ?, updated_at = ? WHERE id = ? AND status = ?",
        timestamp_column
    );
    let result = sqlx::query(&sql)
        .bind(to.as_str())
        .bind(now)
        .bind(now)
        .bind(request_id)
        .bind(from.as_str())
        .execute(&mut **tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::already_processed(
            "the request status changed concurrently",
        ));
    }

    Ok(())
}

async fn fetch_request(pool: &SqlitePool, org_id: Uuid, request_id: Uuid) -> AppResult<DbRequest> {
    sqlx::query_as::<_, DbRequest>(
        "SELECT id, org_id, requester_id, site_id, area_id, workflow_id, status, priority, notes, created_at, updated_at, approved_at, rejected_at, fulfilled_at \
         FROM requests WHERE id = ? AND org_id = ?",
    )
    .bind(request_id.to_string())
    .bind(org_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("request not found"))
}

async fn active_workflow(pool: &SqlitePool, org_id: Uuid) -> AppResult<String> {
    let workflow_id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM workflows WHERE org_id = ? AND trigger_type = ? AND is_active = 1",
    )
    .bind(org_id.to_string())
    .bind(TRIGGER_REQUEST_SUBMITTED)
    .fetch_optional(pool)
    .await?;

    workflow_id.ok_or_else(|| {
        AppError::conflict("no active approval workflow is configured for submissions")
    })
}

async fn level_templates(pool: &SqlitePool, workflow_id: &str) -> AppResult<Vec<LevelTemplate>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT level_order, role_id FROM workflow_levels WHERE workflow_id = ? ORDER BY level_order",
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(level_order, role_id)| {
            Ok(LevelTemplate {
                level_order,
                role_id: parse_uuid(&role_id, "role")?,
            })
        })
        .collect()
}

async fn level_states(pool: &SqlitePool, request_id: &str) -> AppResult<Vec<LevelState>> {
    let rows = fetch_level_rows(pool, request_id).await?;
    rows.into_iter()
        .map(|row| {
            let status = row.status()?;
            Ok(LevelState {
                level_order: row.level_order,
                role_id: parse_uuid(&row.role_id, "role")?,
                status,
            })
        })
        .collect()
}

async fn fetch_level_rows(pool: &SqlitePool, request_id: &str) -> AppResult<Vec<DbApprovalLevel>> {
    let rows = sqlx::query_as::<_, DbApprovalLevel>(
        "SELECT id, request_id, level_order, role_id, status, approved_by, approved_at, comments, rejection_reason \
         FROM request_approval_levels WHERE request_id = ? ORDER BY level_order",
    )
    .bind(request_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn load_detail(pool: &SqlitePool, db_request: DbRequest) -> AppResult<PurchaseRequest> {
    let items: Vec<(String, String, String, i64, Option<String>, Option<f64>)> = sqlx::query_as(
        "SELECT id, catalog_item_id, name, quantity, notes, cost_per_unit \
         FROM request_items WHERE request_id = ? ORDER BY name",
    )
    .bind(&db_request.id)
    .fetch_all(pool)
    .await?;

    let items = items
        .into_iter()
        .map(|(id, catalog_item_id, name, quantity, notes, cost_per_unit)| {
            Ok(RequestItem {
                id: parse_uuid(&id, "request item")?,
                catalog_item_id: parse_uuid(&catalog_item_id, "catalog item")?,
                name,
                quantity,
                notes,
                cost_per_unit,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let levels = fetch_level_rows(pool, &db_request.id)
        .await?
        .into_iter()
        .map(ApprovalLevelInstance::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    db_request.into_request(items, levels)
}
