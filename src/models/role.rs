use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::utils::parse_uuid;

/// The breadth a role is meant to be granted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleScope {
    Organization,
    Site,
    Area,
}

impl RoleScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "organization" => Some(Self::Organization),
            "site" => Some(Self::Site),
            "area" => Some(Self::Area),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Site => "site",
            Self::Area => "area",
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub scope: RoleScope,
    #[schema(example = "#2563eb")]
    pub color: String,
    pub is_system: bool,
    /// Permission full names (`category.action`).
    pub permissions: Vec<String>,
    /// Number of users holding at least one assignment of this role.
    pub user_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub description: Option<String>,
    pub scope: String,
    pub color: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbRole {
    pub fn into_role(self, permissions: Vec<String>, user_count: i64) -> Result<Role, AppError> {
        let scope = RoleScope::parse(&self.scope)
            .ok_or_else(|| AppError::internal(format!("invalid role scope: {}", self.scope)))?;
        Ok(Role {
            id: parse_uuid(&self.id, "role")?,
            name: self.name,
            description: self.description,
            scope,
            color: self.color,
            is_system: self.is_system,
            permissions,
            user_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "Site Manager")]
    pub name: String,
    #[schema(example = "Approves requests for their site")]
    pub description: Option<String>,
    pub scope: RoleScope,
    #[schema(example = "#2563eb")]
    pub color: Option<String>,
    #[schema(example = json!(["requests.view_requests", "requests.approve_requests"]))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCloneRequest {
    #[schema(example = "Site Manager (copy)")]
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionInfo {
    #[schema(example = "requests.approve_requests")]
    pub full_name: String,
    pub description: String,
}

/// One category of the system permission catalog.
#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionGroup {
    #[schema(example = "requests")]
    pub category: String,
    pub permissions: Vec<PermissionInfo>,
}
