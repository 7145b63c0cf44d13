use std::sync::Arc;

use axum::{extract::State, response::IntoResponse};
use chrono::NaiveDate;
use expensa_core::models::{CreateExpenseRequest, Expense, ExpenseStatus, UpdateExpenseRequest};
use expensa_core::AppError;
use expensa_infra::ErrorResponse;
use expensa_services::ExpenseListQuery;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::{created, ok, Deleted};
use crate::auth::AuthUser;
use crate::error::{HttpAppError, ValidatedJson, ValidatedQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExpensesQuery {
    /// Fetch a single expense. Other filters are ignored when set.
    pub id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    /// Comma-separated statuses, or `all`.
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Only the caller's own expenses.
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExpenseIdQuery {
    pub id: Uuid,
}

/// `None` means every status.
fn parse_statuses(status: Option<&str>) -> Result<Option<Vec<ExpenseStatus>>, AppError> {
    let Some(raw) = status.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if raw.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    raw.split(',')
        .map(|s| s.parse::<ExpenseStatus>())
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[utoipa::path(
    post,
    path = "/api/v1/expenses",
    tag = "expenses",
    request_body = CreateExpenseRequest,
    responses(
        (status = 201, description = "Expense recorded as DRAFT (or FLAGGED above the threshold)", body = Expense),
        (status = 400, description = "Invalid fields", body = ErrorResponse),
        (status = 403, description = "Role cannot submit expenses", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id, organization_id = %request.organization_id))]
pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateExpenseRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(created(state.expenses.create(&user.0, request).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/expenses",
    tag = "expenses",
    params(ExpensesQuery),
    responses(
        (status = 200, description = "One expense when `id` is given, otherwise a list, newest first", body = Vec<Expense>),
        (status = 400, description = "Missing organization_id or bad filter", body = ErrorResponse),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_expenses(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedQuery(query): ValidatedQuery<ExpensesQuery>,
) -> Result<axum::response::Response, HttpAppError> {
    if let Some(id) = query.id {
        let expense = state.expenses.get(&user.0, id).await?;
        return Ok(ok(expense).into_response());
    }

    let organization_id = query.organization_id.ok_or_else(|| {
        AppError::InvalidInput("organization_id or id is required".to_string())
    })?;
    let expenses = state
        .expenses
        .list(
            &user.0,
            ExpenseListQuery {
                organization_id,
                statuses: parse_statuses(query.status.as_deref())?,
                from: query.from,
                to: query.to,
                mine: query.mine,
            },
        )
        .await?;
    Ok(ok(expenses).into_response())
}

#[utoipa::path(
    patch,
    path = "/api/v1/expenses",
    tag = "expenses",
    request_body = UpdateExpenseRequest,
    responses(
        (status = 200, description = "Expense updated", body = Expense),
        (status = 403, description = "Not allowed to edit this expense", body = ErrorResponse),
        (status = 404, description = "Expense not found", body = ErrorResponse),
        (status = 409, description = "Expense was reviewed before the edit landed", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id, expense_id = %request.id))]
pub async fn update_expense(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<UpdateExpenseRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(ok(state.expenses.update(&user.0, request).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/expenses",
    tag = "expenses",
    params(ExpenseIdQuery),
    responses(
        (status = 200, description = "Expense deleted", body = Deleted),
        (status = 403, description = "Not allowed to delete this expense", body = ErrorResponse),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state), fields(user_id = %user.0.user_id, expense_id = %query.id))]
pub async fn delete_expense(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedQuery(query): ValidatedQuery<ExpenseIdQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    state.expenses.delete(&user.0, query.id).await?;
    Ok(ok(Deleted { deleted: true }))
}
