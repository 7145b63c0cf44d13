//! Expensa Services Layer
//!
//! Business services behind the HTTP API: organizations and memberships, manual and
//! extracted expenses, the approval workflow, categorization and accounting export.
//! Every operation takes the authenticated [`Actor`] and checks the caller's role through
//! [`AccessControl`] before touching the stores. Keep HTTP concerns in expensa-api.

pub mod services;

pub use expensa_storage::{create_storage, Storage, StorageError, StorageResult};
pub use services::access::{AccessControl, Actor};
pub use services::approval::ApprovalService;
pub use services::categorization::{resolve_category, CategoryCache};
pub use services::expenses::{ExpenseListQuery, ExpenseService};
pub use services::export::{ExportOutput, ExportQuery, ExportService, XLSX_CONTENT_TYPE};
pub use services::extraction::{
    AnthropicReceiptExtractor, Extraction, ExtractionError, ReceiptExtractor, ReceiptImage,
    RetryingExtractor,
};
pub use services::intake::{IntakeService, IntakeSettings, ReceiptUpload};
pub use services::organizations::OrganizationService;
pub use services::receipt_files::ReceiptFiles;
pub use services::users::UserService;
