use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::utils::parse_uuid;
use crate::workflow::{LevelStatus, RequestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PurchaseRequest {
    pub id: Uuid,
    pub status: RequestStatus,
    pub priority: Priority,
    pub requester_id: Uuid,
    pub site_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_id: Option<Uuid>,
    pub workflow_id: Uuid,
    pub items: Vec<RequestItem>,
    pub approval_levels: Vec<ApprovalLevelInstance>,
    /// Sum of cost_per_unit * quantity over priced items only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_value: Option<f64>,
    /// Items excluded from the total because they carry no price.
    pub unpriced_items: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfilled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRequest {
    pub id: String,
    pub org_id: String,
    pub requester_id: String,
    pub site_id: String,
    pub area_id: Option<String>,
    pub workflow_id: String,
    pub status: String,
    pub priority: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl DbRequest {
    pub fn status(&self) -> Result<RequestStatus, AppError> {
        RequestStatus::parse(&self.status)
            .ok_or_else(|| AppError::internal(format!("invalid request status: {}", self.status)))
    }

    pub fn into_request(
        self,
        items: Vec<RequestItem>,
        approval_levels: Vec<ApprovalLevelInstance>,
    ) -> Result<PurchaseRequest, AppError> {
        let status = self.status()?;
        let priority = Priority::parse(&self.priority)
            .ok_or_else(|| AppError::internal(format!("invalid priority: {}", self.priority)))?;
        let (total_value, unpriced_items) = derive_total(&items);

        Ok(PurchaseRequest {
            id: parse_uuid(&self.id, "request")?,
            status,
            priority,
            requester_id: parse_uuid(&self.requester_id, "user")?,
            site_id: parse_uuid(&self.site_id, "site")?,
            area_id: match self.area_id {
                Some(ref a) => Some(parse_uuid(a, "area")?),
                None => None,
            },
            workflow_id: parse_uuid(&self.workflow_id, "workflow")?,
            items,
            approval_levels,
            total_value,
            unpriced_items,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            approved_at: self.approved_at,
            rejected_at: self.rejected_at,
            fulfilled_at: self.fulfilled_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestItem {
    pub id: Uuid,
    pub catalog_item_id: Uuid,
    pub name: String,
    pub quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_unit: Option<f64>,
}

/// Runtime snapshot of one approval level for one request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApprovalLevelInstance {
    pub level_order: i64,
    pub role_id: Uuid,
    pub status: LevelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbApprovalLevel {
    pub id: String,
    pub request_id: String,
    pub level_order: i64,
    pub role_id: String,
    pub status: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub rejection_reason: Option<String>,
}

impl DbApprovalLevel {
    pub fn status(&self) -> Result<LevelStatus, AppError> {
        LevelStatus::parse(&self.status)
            .ok_or_else(|| AppError::internal(format!("invalid level status: {}", self.status)))
    }
}

impl TryFrom<DbApprovalLevel> for ApprovalLevelInstance {
    type Error = AppError;

    fn try_from(value: DbApprovalLevel) -> Result<Self, Self::Error> {
        let status = value.status()?;
        Ok(ApprovalLevelInstance {
            level_order: value.level_order,
            role_id: parse_uuid(&value.role_id, "role")?,
            status,
            approved_by: match value.approved_by {
                Some(ref u) => Some(parse_uuid(u, "user")?),
                None => None,
            },
            approved_at: value.approved_at,
            comments: value.comments,
            rejection_reason: value.rejection_reason,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestItemInput {
    pub catalog_item_id: Uuid,
    #[schema(example = 3)]
    pub quantity: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestCreateRequest {
    pub site_id: Uuid,
    pub area_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
    pub items: Vec<RequestItemInput>,
}

/// Body for approve: optional reviewer comments.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ApproveBody {
    pub notes: Option<String>,
}

/// Body for reject: the reason is mandatory.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectBody {
    #[schema(example = "budget exceeded")]
    pub notes: String,
}

/// Sum priced items; count the unpriced ones separately.
pub fn derive_total(items: &[RequestItem]) -> (Option<f64>, i64) {
    let mut total = 0.0_f64;
    let mut priced = 0_i64;
    let mut unpriced = 0_i64;

    for item in items {
        match item.cost_per_unit {
            Some(cost) if cost.is_finite() => {
                total += cost * item.quantity as f64;
                priced += 1;
            }
            _ => unpriced += 1,
        }
    }

    if priced == 0 {
        (None, unpriced)
    } else {
        (Some(total), unpriced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(cost: Option<f64>, quantity: i64) -> RequestItem {
        RequestItem {
            id: Uuid::new_v4(),
            catalog_item_id: Uuid::new_v4(),
            name: "item".to_string(),
            quantity,
            notes: None,
            cost_per_unit: cost,
        }
    }

    #[test]
    fn total_sums_priced_items_only() {
        let items = vec![item(Some(2.5), 4), item(None, 2), item(Some(1.0), 3)];
        let (total, unpriced) = derive_total(&items);
        assert_eq!(total, Some(13.0));
        assert_eq!(unpriced, 1);
    }

    #[test]
    fn all_unpriced_yields_no_total() {
        let items = vec![item(None, 1), item(Some(f64::NAN), 2)];
        let (total, unpriced) = derive_total(&items);
        assert_eq!(total, None);
        assert_eq!(unpriced, 2);
    }

    #[test]
    fn empty_request_has_no_total() {
        let (total, unpriced) = derive_total(&[]);
        assert_eq!(total, None);
        assert_eq!(unpriced, 0);
    }
}
