pub mod approvals;
pub mod categories;
pub mod expenses;
pub mod export;
pub mod health;
pub mod members;
pub mod organizations;
pub mod receipts;
pub mod users;

use axum::http::StatusCode;
use axum::Json;
use expensa_infra::SuccessResponse;

/// `200 {"success": true, "data": ...}`
pub(crate) fn ok<T>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse::new(data))
}

/// `201 {"success": true, "data": ...}`
pub(crate) fn created<T>(data: T) -> (StatusCode, Json<SuccessResponse<T>>) {
    (StatusCode::CREATED, ok(data))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct Deleted {
    pub deleted: bool,
}
