use std::sync::Arc;

use axum::{extract::State, response::IntoResponse};
use expensa_core::models::{UpsertUserRequest, User};
use expensa_infra::ErrorResponse;

use super::ok;
use crate::auth::AuthUser;
use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = UpsertUserRequest,
    responses(
        (status = 200, description = "Profile created or updated", body = User),
        (status = 400, description = "No email in body or token", body = ErrorResponse),
        (status = 403, description = "Body email differs from the token email", body = ErrorResponse),
        (status = 409, description = "Email belongs to another user", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id))]
pub async fn upsert_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<UpsertUserRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let profile = state.users.upsert_profile(&user.0, request).await?;
    Ok(ok(profile))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Caller's profile", body = User),
        (status = 404, description = "Profile not created yet", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.users.me(&user.0).await?))
}
