use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Profile of an identity owned by the external auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request DTO for `POST /users`. The id always comes from the bearer token.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct UpsertUserRequest {
    #[serde(default)]
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(length(max = 120, message = "display_name must be at most 120 characters"))]
    pub display_name: Option<String>,
}
