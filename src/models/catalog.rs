use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::utils::parse_uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCategory {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbCategory> for Category {
    type Error = AppError;

    fn try_from(value: DbCategory) -> Result<Self, Self::Error> {
        Ok(Category {
            id: parse_uuid(&value.id, "category")?,
            name: value.name,
            description: value.description,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CatalogItem {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[schema(example = "box")]
    pub unit: String,
    /// None means unpriced; the item is excluded from request totals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_unit: Option<f64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCatalogItem {
    pub id: String,
    pub org_id: String,
    pub category_id: String,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub cost_per_unit: Option<f64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbCatalogItem> for CatalogItem {
    type Error = AppError;

    fn try_from(value: DbCatalogItem) -> Result<Self, Self::Error> {
        Ok(CatalogItem {
            id: parse_uuid(&value.id, "catalog item")?,
            category_id: parse_uuid(&value.category_id, "category")?,
            name: value.name,
            description: value.description,
            unit: value.unit,
            cost_per_unit: value.cost_per_unit,
            is_active: value.is_active,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CategoryCreateRequest {
    #[schema(example = "Stationery")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CatalogItemCreateRequest {
    pub category_id: Uuid,
    #[schema(example = "A4 paper, 80gsm")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "ream")]
    pub unit: Option<String>,
    #[schema(example = 4.95)]
    pub cost_per_unit: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CatalogItemUpdateRequest {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub cost_per_unit: Option<f64>,
    pub is_active: Option<bool>,
}
