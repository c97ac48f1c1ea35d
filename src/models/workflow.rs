use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::utils::parse_uuid;

/// An approval workflow template: an ordered list of role-bound levels for
/// one trigger type. At most one workflow per trigger is active at a time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApprovalWorkflow {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[schema(example = "request_submitted")]
    pub trigger_type: String,
    pub is_default: bool,
    pub is_active: bool,
    pub version: i64,
    pub levels: Vec<ApprovalLevel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One template level. `level_order` is 1-based and contiguous.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovalLevel {
    pub level_order: i64,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbWorkflow {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: String,
    pub is_default: bool,
    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbWorkflow {
    pub fn into_workflow(self, levels: Vec<ApprovalLevel>) -> Result<ApprovalWorkflow, AppError> {
        Ok(ApprovalWorkflow {
            id: parse_uuid(&self.id, "workflow")?,
            name: self.name,
            description: self.description,
            trigger_type: self.trigger_type,
            is_default: self.is_default,
            is_active: self.is_active,
            version: self.version,
            levels,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Level input: order is assigned 1..N from array position.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LevelInput {
    pub role_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkflowCreateRequest {
    #[schema(example = "Two-step approval")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "request_submitted")]
    pub trigger_type: Option<String>,
    pub levels: Vec<LevelInput>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkflowUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub levels: Option<Vec<LevelInput>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkflowDuplicateRequest {
    #[schema(example = "Two-step approval (copy)")]
    pub name: String,
}
