use std::sync::Arc;

use axum::{extract::State, response::IntoResponse};
use expensa_core::models::CategoryListResponse;
use expensa_infra::ErrorResponse;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::ok;
use crate::auth::AuthUser;
use crate::error::{HttpAppError, ValidatedQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct CategoriesQuery {
    /// Include this organization's custom categories.
    pub organization_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    tag = "categories",
    params(CategoriesQuery),
    responses(
        (status = 200, description = "Global categories plus custom names", body = CategoryListResponse),
        (status = 403, description = "Not a member of the organization", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedQuery(query): ValidatedQuery<CategoriesQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state
        .organizations
        .categories(&user.0, query.organization_id)
        .await?))
}
