use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use expensa_core::models::{
    AddMemberRequest, MemberWithUser, OrganizationMember, UpdateMemberRoleRequest,
};
use expensa_infra::ErrorResponse;
use uuid::Uuid;

use super::{created, ok, Deleted};
use crate::auth::AuthUser;
use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/organizations/{id}/members",
    tag = "members",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Members with their profiles", body = Vec<MemberWithUser>),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.organizations.list_members(&user.0, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/organizations/{id}/members",
    tag = "members",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = MemberWithUser),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "Already a member", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id, organization_id = %id))]
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<AddMemberRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(created(state.organizations.add_member(&user.0, id, request).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/organizations/{id}/members/{user_id}",
    tag = "members",
    params(
        ("id" = Uuid, Path, description = "Organization ID"),
        ("user_id" = Uuid, Path, description = "Member's user ID")
    ),
    request_body = UpdateMemberRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = OrganizationMember),
        (status = 403, description = "Not allowed to grant or revoke this role", body = ErrorResponse),
        (status = 409, description = "Would leave the organization without an owner", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id, organization_id = %id))]
pub async fn change_role(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(request): ValidatedJson<UpdateMemberRoleRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state
        .organizations
        .change_role(&user.0, id, member_id, request)
        .await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/organizations/{id}/members/{user_id}",
    tag = "members",
    params(
        ("id" = Uuid, Path, description = "Organization ID"),
        ("user_id" = Uuid, Path, description = "Member's user ID; the caller's own id leaves")
    ),
    responses(
        (status = 200, description = "Member removed", body = Deleted),
        (status = 409, description = "Would leave the organization without an owner", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state), fields(user_id = %user.0.user_id, organization_id = %id))]
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpAppError> {
    state
        .organizations
        .remove_member(&user.0, id, member_id)
        .await?;
    Ok(ok(Deleted { deleted: true }))
}
