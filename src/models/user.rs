use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::catalog::Category;
use crate::models::site::{Area, Site};
use crate::utils::parse_uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// Legacy single-role display label; authorization uses role assignments.
    pub role_label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: String,
    pub org_id: String,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role_label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_uuid(&value.id, "user")?,
            username: value.username,
            email: value.email,
            first_name: value.first_name,
            last_name: value.last_name,
            role_label: value.role_label,
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
            last_login_at: value.last_login_at,
        })
    }
}

/// Detail view: the account plus its access grants (what the user may see,
/// independent of what their role assignments let them do).
#[derive(Debug, Serialize, ToSchema)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub sites: Vec<Site>,
    pub areas: Vec<Area>,
    pub categories: Vec<Category>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Northwind Supplies")]
    pub organization: String,
    #[schema(example = "ada")]
    pub username: String,
    #[schema(example = "ada@example.com")]
    pub email: Option<String>,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    #[schema(example = "Ada")]
    pub first_name: String,
    #[schema(example = "Lovelace")]
    pub last_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada")]
    pub username: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserCreateRequest {
    #[schema(example = "grace")]
    pub username: String,
    #[schema(example = "grace@example.com")]
    pub email: Option<String>,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    #[schema(example = "Grace")]
    pub first_name: String,
    #[schema(example = "Hopper")]
    pub last_name: String,
    #[schema(example = "staff")]
    pub role_label: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserUpdateRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role_label: Option<String>,
    pub is_active: Option<bool>,
}

/// One `{role_id, site_id?, area_id?}` triple; at most one of site/area set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleAssignmentEntry {
    pub role_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<Uuid>,
}

/// Full-replace payload for a user's role assignment set.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceAssignmentsRequest {
    pub assignments: Vec<RoleAssignmentEntry>,
}

/// Full-replace payload for a user's access grants.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceAccessRequest {
    pub site_ids: Vec<Uuid>,
    pub area_ids: Vec<Uuid>,
    pub category_ids: Vec<Uuid>,
}
