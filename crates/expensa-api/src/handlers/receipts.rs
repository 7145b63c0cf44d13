use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use expensa_core::models::{ExtractRequest, ExtractResponse, UploadResponse};
use expensa_core::AppError;
use expensa_infra::ErrorResponse;
use expensa_services::ReceiptUpload;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{created, ok};
use crate::auth::AuthUser;
use crate::error::{HttpAppError, ValidatedJson, ValidatedQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct UploadQuery {
    /// Target organization for multipart uploads that do not send it as a form field.
    pub organization_id: Option<Uuid>,
}

/// JSON alternative to multipart: the image as a base64 data URI.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DataUriUpload {
    pub organization_id: Uuid,
    /// `data:<mime>;base64,<payload>`
    pub image: String,
}

fn parse_organization_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::InvalidInput("organization_id must be a UUID".to_string()))
}

async fn read_multipart(
    mut multipart: Multipart,
    fallback_org: Option<Uuid>,
) -> Result<(Uuid, ReceiptUpload), AppError> {
    let mut organization_id = fallback_org;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read file: {}", e)))?;
                upload = Some(ReceiptUpload { content_type, data });
            }
            Some("organization_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Invalid form field: {}", e)))?;
                organization_id = Some(parse_organization_id(&text)?);
            }
            _ => {}
        }
    }

    let upload =
        upload.ok_or_else(|| AppError::InvalidInput("Missing 'file' part".to_string()))?;
    let organization_id = organization_id
        .ok_or_else(|| AppError::InvalidInput("organization_id is required".to_string()))?;
    Ok((organization_id, upload))
}

#[utoipa::path(
    post,
    path = "/api/v1/upload",
    tag = "receipts",
    params(UploadQuery),
    request_body(
        content = DataUriUpload,
        description = "multipart/form-data with `file` (+ `organization_id`), or JSON with a data URI"
    ),
    responses(
        (status = 201, description = "Receipt stored", body = UploadResponse),
        (status = 400, description = "Missing file or unsupported type", body = ErrorResponse),
        (status = 403, description = "Role cannot upload receipts", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, query, request), fields(user_id = %user.0.user_id))]
pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedQuery(query): ValidatedQuery<UploadQuery>,
    request: Request,
) -> Result<impl IntoResponse, HttpAppError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (organization_id, upload) = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?;
        read_multipart(multipart, query.organization_id).await?
    } else {
        let Json(body) = Json::<DataUriUpload>::from_request(request, &())
            .await
            .map_err(HttpAppError::from)?;
        (body.organization_id, ReceiptUpload::from_data_uri(&body.image)?)
    };

    let stored = state
        .intake
        .upload(&user.0, organization_id, upload)
        .await?;
    Ok(created(stored))
}

#[utoipa::path(
    post,
    path = "/api/v1/extract",
    tag = "receipts",
    request_body = ExtractRequest,
    responses(
        (status = 201, description = "Receipt extracted and recorded", body = ExtractResponse),
        (status = 400, description = "Neither path nor image_url given", body = ErrorResponse),
        (status = 502, description = "Model call failed", body = ErrorResponse),
        (status = 504, description = "Model call timed out; enter the expense manually", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[tracing::instrument(skip(state, request), fields(user_id = %user.0.user_id, organization_id = %request.organization_id))]
pub async fn extract_receipt(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<ExtractRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(created(state.intake.extract(&user.0, request).await?))
}
