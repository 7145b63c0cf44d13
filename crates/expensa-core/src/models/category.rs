use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Global taxonomy entry used for keyword auto-classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub keywords: Vec<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// Response of `GET /categories`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CategoryListResponse {
    pub categories: Vec<Category>,
    /// Organization-local category names, empty when no organization was given.
    pub custom_categories: Vec<String>,
}
