use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use expensa_core::models::{
    CreateOrganizationRequest, CustomCategoryRequest, InviteCodeResponse,
    JoinOrganizationRequest, OrganizationResponse, OrganizationSettings, OrganizationSummary,
    UpdateOrganizationRequest,
};
use expensa_infra::ErrorResponse;
use uuid::Uuid;

use super::{created, ok, Deleted};
use crate::auth::AuthUser;
use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/api/v1/organizations",
    tag = "organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created; caller is its owner", body = OrganizationResponse),
        (status = 400, description = "Invalid name or slug", body = ErrorResponse),
        (status = 409, description = "Slug already taken", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id))]
pub async fn create_organization(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let organization = state.organizations.create(&user.0, request).await?;
    Ok(created(organization))
}

#[utoipa::path(
    get,
    path = "/api/v1/organizations",
    tag = "organizations",
    responses((status = 200, description = "Organizations the caller belongs to", body = Vec<OrganizationSummary>)),
    security(("bearer" = []))
)]
pub async fn list_organizations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.organizations.list_mine(&user.0).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/organizations/{id}",
    tag = "organizations",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Organization with the caller's role", body = OrganizationResponse),
        (status = 403, description = "Not a member", body = ErrorResponse),
        (status = 404, description = "Organization not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_organization(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.organizations.get(&user.0, id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/organizations/{id}",
    tag = "organizations",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = UpdateOrganizationRequest,
    responses(
        (status = 200, description = "Organization updated", body = OrganizationResponse),
        (status = 403, description = "Owner or admin only", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id, organization_id = %id))]
pub async fn update_organization(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateOrganizationRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.organizations.update(&user.0, id, request).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/organizations/{id}",
    tag = "organizations",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Organization, members and expenses deleted", body = Deleted),
        (status = 403, description = "Owner only", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state), fields(user_id = %user.0.user_id, organization_id = %id))]
pub async fn delete_organization(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    state.organizations.delete(&user.0, id).await?;
    Ok(ok(Deleted { deleted: true }))
}

#[utoipa::path(
    post,
    path = "/api/v1/organizations/{id}/invite",
    tag = "organizations",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "New invite code", body = InviteCodeResponse),
        (status = 403, description = "Owner or admin only", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state), fields(user_id = %user.0.user_id, organization_id = %id))]
pub async fn regenerate_invite(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.organizations.regenerate_invite(&user.0, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/organizations/join",
    tag = "organizations",
    request_body = JoinOrganizationRequest,
    responses(
        (status = 200, description = "Joined as member", body = OrganizationResponse),
        (status = 400, description = "Invalid or expired invite code", body = ErrorResponse),
        (status = 409, description = "Already a member", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id))]
pub async fn join_organization(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<JoinOrganizationRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.organizations.join(&user.0, request).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/organizations/{id}/categories",
    tag = "organizations",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = CustomCategoryRequest,
    responses(
        (status = 201, description = "Category added", body = OrganizationSettings),
        (status = 409, description = "Category already exists", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id, organization_id = %id))]
pub async fn add_category(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<CustomCategoryRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(created(state.organizations.add_category(&user.0, id, request).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/organizations/{id}/categories/{name}",
    tag = "organizations",
    params(
        ("id" = Uuid, Path, description = "Organization ID"),
        ("name" = String, Path, description = "Custom category name")
    ),
    responses(
        (status = 200, description = "Category removed; existing expenses keep it", body = OrganizationSettings),
        (status = 404, description = "No such custom category", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state), fields(user_id = %user.0.user_id, organization_id = %id))]
pub async fn remove_category(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((id, name)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.organizations.remove_category(&user.0, id, &name).await?))
}
