use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::bootstrap;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User};
use crate::utils::{hash_password, parse_uuid, utc_now, verify_password};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Organization and admin account created", body = AuthResponse),
        (status = 409, description = "Username already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    if payload.organization.trim().is_empty() {
        return Err(AppError::validation("organization name must not be blank"));
    }
    if payload.username.trim().is_empty() {
        return Err(AppError::validation("username must not be blank"));
    }
    ensure_username_available(&state.pool, &payload.username).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    let seeded = bootstrap::create_organization(&mut tx, payload.organization.trim(), now).await?;

    sqlx::query(
        "INSERT INTO users (id, org_id, username, email, password_hash, first_name, last_name, role_label, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(seeded.org_id.to_string())
    .bind(payload.username.trim())
    .bind(&payload.email)
    .bind(password_hash)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind("admin")
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // The founding account holds the Administrator role org-wide.
    sqlx::query(
        "INSERT INTO role_assignments (id, user_id, role_id, site_id, area_id, created_at) VALUES (?, ?, ?, NULL, NULL, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(seeded.admin_role_id.to_string())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    let org_id = parse_uuid(&db_user.org_id, "organization")?;
    let token = state.jwt.encode(user_id, org_id)?;
    let user: User = db_user.try_into()?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, org_id, username, email, password_hash, first_name, last_name, role_label, is_active, created_at, updated_at, last_login_at \
         FROM users WHERE username = ?",
    )
    .bind(&payload.username)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }
    if !db_user.is_active {
        return Err(AppError::forbidden("account is deactivated"));
    }

    let now = utc_now();
    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(now)
        .bind(&db_user.id)
        .execute(&state.pool)
        .await?;

    let user_id = parse_uuid(&db_user.id, "user")?;
    let org_id = parse_uuid(&db_user.org_id, "organization")?;
    let token = state.jwt.encode(user_id, org_id)?;
    let mut user: User = db_user.try_into()?;
    user.last_login_at = Some(now);

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    let user: User = db_user.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Logout acknowledged"))
)]
pub async fn logout(_auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

pub(crate) async fn ensure_username_available(pool: &SqlitePool, username: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE username = ?")
        .bind(username.trim())
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("username already in use"));
    }

    Ok(())
}

pub(crate) async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(
        "SELECT id, org_id, username, email, password_hash, first_name, last_name, role_label, is_active, created_at, updated_at, last_login_at \
         FROM users WHERE id = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))
}
