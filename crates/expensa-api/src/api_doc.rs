//! OpenAPI documentation.
//! API version is in `crate::constants::API_VERSION`; handler annotations carry the full path.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers;
use expensa_core::models;
use expensa_infra::ErrorResponse;

/// Registers the `bearer` scheme referenced by every protected path.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Expensa API",
        version = "0.1.0",
        description = "Receipt capture, AI extraction and approval workflow for organizations. All endpoints are versioned under /api/v1/ and require a bearer JWT except health checks."
    ),
    paths(
        // Health
        handlers::health::liveness,
        handlers::health::readiness,
        // Users
        handlers::users::upsert_profile,
        handlers::users::me,
        // Organizations
        handlers::organizations::create_organization,
        handlers::organizations::list_organizations,
        handlers::organizations::get_organization,
        handlers::organizations::update_organization,
        handlers::organizations::delete_organization,
        handlers::organizations::regenerate_invite,
        handlers::organizations::join_organization,
        handlers::organizations::add_category,
        handlers::organizations::remove_category,
        // Members
        handlers::members::list_members,
        handlers::members::add_member,
        handlers::members::change_role,
        handlers::members::remove_member,
        // Categories
        handlers::categories::list_categories,
        // Expenses
        handlers::expenses::create_expense,
        handlers::expenses::get_expenses,
        handlers::expenses::update_expense,
        handlers::expenses::delete_expense,
        // Approvals
        handlers::approvals::approve_expense,
        handlers::approvals::flag_expense,
        handlers::approvals::reject_expense,
        handlers::approvals::approval_queue,
        // Receipts
        handlers::receipts::upload_receipt,
        handlers::receipts::extract_receipt,
        // Export
        handlers::export::export_expenses,
    ),
    components(
        schemas(
            models::User,
            models::UpsertUserRequest,
            models::OrganizationSettings,
            models::OrganizationResponse,
            models::OrganizationSummary,
            models::CreateOrganizationRequest,
            models::UpdateOrganizationRequest,
            models::JoinOrganizationRequest,
            models::InviteCodeResponse,
            models::CustomCategoryRequest,
            models::Role,
            models::OrganizationMember,
            models::MemberWithUser,
            models::AddMemberRequest,
            models::UpdateMemberRoleRequest,
            models::Category,
            models::CategoryListResponse,
            models::ExpenseStatus,
            models::ReceiptItem,
            models::Expense,
            models::CreateExpenseRequest,
            models::UpdateExpenseRequest,
            models::ReviewRequest,
            models::ExtractedReceipt,
            models::ExtractRequest,
            models::ExtractResponse,
            models::UploadResponse,
            models::ExportFormat,
            models::CategoryTotal,
            models::ExportSummary,
            handlers::Deleted,
            handlers::receipts::DataUriUpload,
            ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Liveness and readiness checks"),
        (name = "users", description = "Profile of the authenticated user"),
        (name = "organizations", description = "Organizations, invite codes and custom categories"),
        (name = "members", description = "Membership and roles"),
        (name = "categories", description = "Default and organization categories"),
        (name = "expenses", description = "Expense records"),
        (name = "approvals", description = "Review workflow: approve, flag, reject and the queue"),
        (name = "receipts", description = "Receipt upload and AI extraction"),
        (name = "export", description = "Spreadsheet and summary export")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_path_is_versioned_and_bearer_is_registered() {
        let doc = get_openapi_spec();
        assert!(doc.paths.paths.keys().all(|p| p.starts_with("/api/v1/")));
        assert!(doc.paths.paths.contains_key("/api/v1/expenses/{id}/approve"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
