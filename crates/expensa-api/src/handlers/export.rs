use std::sync::Arc;

use axum::{
    extract::State,
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use expensa_core::models::{ExportFormat, ExportSummary};
use expensa_infra::ErrorResponse;
use expensa_services::{ExportOutput, ExportQuery, XLSX_CONTENT_TYPE};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::ok;
use crate::auth::AuthUser;
use crate::error::{HttpAppError, ValidatedQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExportParams {
    pub organization_id: Uuid,
    /// Defaults to VERIFIED; `all` exports every status.
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// `excel` (default) or `summary`.
    pub format: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/export",
    tag = "export",
    params(ExportParams),
    responses(
        (status = 200, description = "Spreadsheet attachment, or JSON summary when format=summary", body = ExportSummary),
        (status = 400, description = "Bad status, format or date range", body = ErrorResponse),
        (status = 403, description = "Owner, admin or accountant only", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state), fields(user_id = %user.0.user_id, organization_id = %params.organization_id))]
pub async fn export_expenses(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedQuery(params): ValidatedQuery<ExportParams>,
) -> Result<Response, HttpAppError> {
    let format = match params.format.as_deref() {
        Some(f) if !f.trim().is_empty() => f.parse::<ExportFormat>()?,
        _ => ExportFormat::default(),
    };

    let output = state
        .export
        .export(
            &user.0,
            ExportQuery {
                organization_id: params.organization_id,
                status: params.status,
                from: params.from,
                to: params.to,
                format,
            },
        )
        .await?;

    Ok(match output {
        ExportOutput::Spreadsheet { filename, bytes } => (
            [
                (CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                (
                    CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            bytes,
        )
            .into_response(),
        ExportOutput::Summary(summary) => ok(summary).into_response(),
    })
}
