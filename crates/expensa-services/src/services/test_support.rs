//! Wiring for service tests: every service over one in-memory store, a tempdir storage
//! backend and a manual clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use expensa_core::models::{
    normalize_extraction, CreateExpenseRequest, CreateOrganizationRequest, Expense, Role,
};
use expensa_core::{ManualClock, RolePolicy};
use expensa_db::{MemberStore, MemoryStore, UserStore};
use expensa_storage::LocalStorage;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

use super::access::{AccessControl, Actor};
use super::approval::ApprovalService;
use super::categorization::CategoryCache;
use super::expenses::ExpenseService;
use super::export::ExportService;
use super::extraction::{Extraction, ExtractionError, ReceiptExtractor, ReceiptImage};
use super::intake::{IntakeService, IntakeSettings};
use super::organizations::OrganizationService;
use super::receipt_files::ReceiptFiles;
use super::users::UserService;

/// Extractor that answers every call with the same canned result.
pub struct ScriptedExtractor {
    response: Option<Value>,
}

impl ScriptedExtractor {
    pub fn returning(raw: Value) -> Self {
        Self {
            response: Some(raw),
        }
    }

    pub fn failing() -> Self {
        Self { response: None }
    }
}

#[async_trait]
impl ReceiptExtractor for ScriptedExtractor {
    async fn extract(&self, _image: ReceiptImage, today: NaiveDate) -> Result<Extraction, ExtractionError> {
        match &self.response {
            Some(raw) => Ok(Extraction {
                receipt: normalize_extraction(raw, today),
                raw: raw.clone(),
            }),
            None => Err(ExtractionError::Upstream("scripted failure".to_string())),
        }
    }
}

pub struct Fixture {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<LocalStorage>,
    pub owner: Actor,
    pub org: Uuid,
    pub users: Arc<UserService>,
    pub organizations: Arc<OrganizationService>,
    pub expenses: Arc<ExpenseService>,
    pub approvals: Arc<ApprovalService>,
    pub export: Arc<ExportService>,
    pub intake: Arc<IntakeService>,
    _dir: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::build(None, ScriptedExtractor::returning(json!({}))).await
    }

    pub async fn with_threshold(threshold: Option<Decimal>) -> Self {
        Self::build(threshold, ScriptedExtractor::returning(json!({}))).await
    }

    pub async fn with_extractor(extractor: ScriptedExtractor) -> Self {
        Self::build(None, extractor).await
    }

    async fn build(threshold: Option<Decimal>, extractor: ScriptedExtractor) -> Self {
        let store = MemoryStore::with_default_categories();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(
            LocalStorage::new(dir.path(), "http://localhost:3000/files".to_string())
                .await
                .unwrap(),
        );

        let shared = Arc::new(store.clone());
        let access = AccessControl::new(shared.clone(), Arc::new(RolePolicy));
        let categories = Arc::new(CategoryCache::new(
            shared.clone(),
            clock.clone(),
            Duration::from_secs(300),
        ));

        let files = Arc::new(ReceiptFiles::new(storage.clone(), shared.clone()));

        let users = Arc::new(UserService::new(shared.clone()));
        let organizations = Arc::new(OrganizationService::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            shared.clone(),
            users.clone(),
            access.clone(),
            categories.clone(),
            files.clone(),
            clock.clone(),
            7,
        ));
        let expenses = Arc::new(ExpenseService::new(
            shared.clone(),
            access.clone(),
            categories,
            clock.clone(),
            threshold,
            files.clone(),
        ));
        let approvals = Arc::new(ApprovalService::new(shared.clone(), access.clone(), files));
        let export = Arc::new(ExportService::new(
            shared.clone(),
            access.clone(),
            clock.clone(),
            "#,##0".to_string(),
        ));
        let intake = Arc::new(
            IntakeService::new(
                storage.clone(),
                Arc::new(extractor),
                expenses.clone(),
                access,
                clock.clone(),
                IntakeSettings {
                    max_file_size_bytes: 1024 * 1024,
                    allowed_content_types: vec![
                        "image/jpeg".to_string(),
                        "image/png".to_string(),
                        "image/webp".to_string(),
                    ],
                    fetch_timeout: Duration::from_secs(5),
                },
            )
            .unwrap(),
        );

        let owner = Actor::new(Uuid::new_v4(), Some("owner@acme.test".to_string()));
        let org = organizations
            .create(
                &owner,
                CreateOrganizationRequest {
                    name: "Acme Corp".to_string(),
                    slug: None,
                },
            )
            .await
            .unwrap()
            .id;

        Self {
            store,
            clock,
            storage,
            owner,
            org,
            users,
            organizations,
            expenses,
            approvals,
            export,
            intake,
            _dir: dir,
        }
    }

    /// A registered user that is not (yet) a member of anything.
    pub async fn user(&self, email: &str) -> Actor {
        let actor = Actor::new(Uuid::new_v4(), Some(email.to_string()));
        self.store.upsert(actor.user_id, email, None).await.unwrap();
        actor
    }

    pub async fn join_as(&self, role: Role) -> Actor {
        let email = format!("{}-{}@acme.test", role, Uuid::new_v4().simple());
        let actor = self.user(&email).await;
        self.store.add(self.org, actor.user_id, role).await.unwrap();
        actor
    }

    pub async fn draft(&self, actor: &Actor, merchant: &str, amount: i64) -> Expense {
        self.expenses
            .create(
                actor,
                CreateExpenseRequest {
                    organization_id: self.org,
                    merchant_name: merchant.to_string(),
                    amount: Decimal::from(amount),
                    currency: None,
                    category: None,
                    date: None,
                    description: None,
                    items: vec![],
                    image_url: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn store_expense(&self, id: Uuid) -> Option<Expense> {
        expensa_db::ExpenseStore::get(&self.store, id).await.unwrap()
    }
}
