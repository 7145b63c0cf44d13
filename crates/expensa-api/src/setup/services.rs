//! Service wiring: stores, extractor and the services built on top of them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use expensa_core::{Clock, Config, RolePolicy};
use expensa_db::{
    CategoryRepository, CategoryStore, ExpenseRepository, ExpenseStore, MemberRepository,
    MemberStore, OrganizationRepository, OrganizationStore, UserRepository, UserStore,
};
use expensa_services::{
    AccessControl, AnthropicReceiptExtractor, ApprovalService, CategoryCache, ExpenseService,
    ExportService, IntakeService, IntakeSettings, OrganizationService, ReceiptExtractor,
    ReceiptFiles, RetryingExtractor, UserService,
};
use expensa_storage::Storage;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::auth::JwtVerifier;
use crate::state::AppState;

/// The persistence seams every service is built on.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub organizations: Arc<dyn OrganizationStore>,
    pub members: Arc<dyn MemberStore>,
    pub categories: Arc<dyn CategoryStore>,
    pub expenses: Arc<dyn ExpenseStore>,
}

impl Stores {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            organizations: Arc::new(OrganizationRepository::new(pool.clone())),
            members: Arc::new(MemberRepository::new(pool.clone())),
            categories: Arc::new(CategoryRepository::new(pool.clone())),
            expenses: Arc::new(ExpenseRepository::new(pool.clone())),
        }
    }
}

/// Tunables the services read at construction time.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub jwt_secret: String,
    pub category_cache_ttl: Duration,
    pub flag_amount_threshold: Option<Decimal>,
    pub invite_code_ttl_days: i64,
    pub export_currency_format: String,
    pub intake: IntakeSettings,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret().to_string(),
            category_cache_ttl: config.category_cache_ttl(),
            flag_amount_threshold: config.flag_amount_threshold(),
            invite_code_ttl_days: config.invite_code_ttl_days(),
            export_currency_format: config.export_currency_format().to_string(),
            intake: IntakeSettings {
                max_file_size_bytes: config.receipt_max_file_size_bytes(),
                allowed_content_types: config.receipt_allowed_content_types().to_vec(),
                fetch_timeout: config.extraction_timeout(),
            },
        }
    }
}

/// The vision model client, wrapped with per-attempt timeout and retries.
pub fn build_extractor(config: &Config) -> Result<Arc<dyn ReceiptExtractor>> {
    let client = AnthropicReceiptExtractor::new(
        config.anthropic_api_key().to_string(),
        config.anthropic_api_base().to_string(),
        config.anthropic_vision_model().to_string(),
        config.extraction_max_tokens(),
    )
    .context("Failed to build the receipt extractor")?;

    tracing::info!(
        model = %config.anthropic_vision_model(),
        timeout_secs = config.extraction_timeout().as_secs(),
        max_retries = config.extraction_max_retries(),
        "Receipt extractor configured"
    );

    Ok(Arc::new(RetryingExtractor::new(
        Arc::new(client),
        config.extraction_timeout(),
        config.extraction_max_retries(),
    )))
}

/// Assemble every service into the shared handler state.
pub fn build_state(
    pool: Option<PgPool>,
    stores: Stores,
    storage: Arc<dyn Storage>,
    extractor: Arc<dyn ReceiptExtractor>,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
) -> Result<Arc<AppState>> {
    let access = AccessControl::new(stores.members.clone(), Arc::new(RolePolicy));
    let categories = Arc::new(CategoryCache::new(
        stores.categories.clone(),
        clock.clone(),
        settings.category_cache_ttl,
    ));

    let files = Arc::new(ReceiptFiles::new(storage.clone(), stores.expenses.clone()));

    let users = Arc::new(UserService::new(stores.users.clone()));
    let organizations = Arc::new(OrganizationService::new(
        stores.organizations.clone(),
        stores.members.clone(),
        stores.users.clone(),
        stores.expenses.clone(),
        users.clone(),
        access.clone(),
        categories.clone(),
        files.clone(),
        clock.clone(),
        settings.invite_code_ttl_days,
    ));
    let expenses = Arc::new(ExpenseService::new(
        stores.expenses.clone(),
        access.clone(),
        categories,
        clock.clone(),
        settings.flag_amount_threshold,
        files.clone(),
    ));
    let approvals = Arc::new(ApprovalService::new(
        stores.expenses.clone(),
        access.clone(),
        files,
    ));
    let export = Arc::new(ExportService::new(
        stores.expenses.clone(),
        access.clone(),
        clock.clone(),
        settings.export_currency_format,
    ));
    let intake = Arc::new(IntakeService::new(
        storage,
        extractor,
        expenses.clone(),
        access,
        clock,
        settings.intake,
    )?);

    Ok(Arc::new(AppState {
        pool,
        jwt: Arc::new(JwtVerifier::new(&settings.jwt_secret)),
        users,
        organizations,
        expenses,
        approvals,
        export,
        intake,
    }))
}
