//! Application state shared by every handler.

use std::sync::Arc;

use expensa_services::{
    ApprovalService, ExpenseService, ExportService, IntakeService, OrganizationService,
    UserService,
};
use sqlx::PgPool;

use crate::auth::JwtVerifier;

#[derive(Clone)]
pub struct AppState {
    /// `None` when running against in-memory stores; readiness then skips the ping.
    pub pool: Option<PgPool>,
    pub jwt: Arc<JwtVerifier>,
    pub users: Arc<UserService>,
    pub organizations: Arc<OrganizationService>,
    pub expenses: Arc<ExpenseService>,
    pub approvals: Arc<ApprovalService>,
    pub export: Arc<ExportService>,
    pub intake: Arc<IntakeService>,
}
