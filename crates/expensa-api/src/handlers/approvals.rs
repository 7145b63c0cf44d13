use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use bytes::Bytes;
use expensa_core::models::{Expense, ReviewRequest};
use expensa_core::AppError;
use expensa_infra::ErrorResponse;
use uuid::Uuid;
use validator::Validate;

use super::{ok, Deleted};
use crate::auth::AuthUser;
use crate::error::HttpAppError;
use crate::state::AppState;

/// The review body is optional; an empty body means no reason.
fn review_body(body: &Bytes) -> Result<ReviewRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReviewRequest::default());
    }
    let request: ReviewRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid request body: {}", e)))?;
    request.validate()?;
    Ok(request)
}

#[utoipa::path(
    post,
    path = "/api/v1/expenses/{id}/approve",
    tag = "approvals",
    params(("id" = Uuid, Path, description = "Expense ID")),
    responses(
        (status = 200, description = "Expense is now VERIFIED", body = Expense),
        (status = 403, description = "Owner, admin or accountant only", body = ErrorResponse),
        (status = 409, description = "Expense is already VERIFIED", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state), fields(user_id = %user.0.user_id, expense_id = %id))]
pub async fn approve_expense(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.approvals.approve(&user.0, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/expenses/{id}/flag",
    tag = "approvals",
    params(("id" = Uuid, Path, description = "Expense ID")),
    request_body(content = Option<ReviewRequest>, description = "Optional reason, logged only"),
    responses(
        (status = 200, description = "Expense is now FLAGGED", body = Expense),
        (status = 409, description = "Only DRAFT expenses can be flagged", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, body), fields(user_id = %user.0.user_id, expense_id = %id))]
pub async fn flag_expense(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let review = review_body(&body)?;
    Ok(ok(state
        .approvals
        .flag(&user.0, id, review.reason.as_deref())
        .await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/expenses/{id}/reject",
    tag = "approvals",
    params(("id" = Uuid, Path, description = "Expense ID")),
    request_body(content = Option<ReviewRequest>, description = "Optional reason, logged only"),
    responses(
        (status = 200, description = "Expense rejected and deleted", body = Deleted),
        (status = 409, description = "VERIFIED expenses cannot be rejected", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, body), fields(user_id = %user.0.user_id, expense_id = %id))]
pub async fn reject_expense(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let review = review_body(&body)?;
    state
        .approvals
        .reject(&user.0, id, review.reason.as_deref())
        .await?;
    Ok(ok(Deleted { deleted: true }))
}

#[utoipa::path(
    get,
    path = "/api/v1/organizations/{id}/approvals",
    tag = "approvals",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Pending expenses, oldest first", body = Vec<Expense>),
        (status = 403, description = "Owner, admin or accountant only", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn approval_queue(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.approvals.queue(&user.0, id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_review_body_has_no_reason() {
        assert!(review_body(&Bytes::new()).unwrap().reason.is_none());
        assert!(review_body(&Bytes::from_static(b"  \n")).unwrap().reason.is_none());
        let review = review_body(&Bytes::from_static(br#"{"reason":"duplicate"}"#)).unwrap();
        assert_eq!(review.reason.as_deref(), Some("duplicate"));
        assert!(review_body(&Bytes::from_static(b"not json")).is_err());
    }
}
