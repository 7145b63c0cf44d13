//! Test helpers: build the full router over in-memory stores.
//!
//! Run from workspace root: `cargo test -p expensa-api`. No database is needed; the
//! stores are `expensa_db::MemoryStore` and receipts land in a temp directory.

#![allow(dead_code)]

pub mod auth;
pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use chrono::{TimeZone, Utc};
use expensa_api::constants;
use expensa_api::setup::routes::{build_router, HttpSettings};
use expensa_api::setup::services::{build_state, ServiceSettings, Stores};
use expensa_core::ManualClock;
use expensa_db::MemoryStore;
use expensa_services::{IntakeSettings, ReceiptExtractor};
use expensa_storage::LocalStorage;
use serde_json::{json, Value};
use tempfile::TempDir;

use self::auth::TEST_JWT_SECRET;
use self::fixtures::ScriptedExtractor;

/// API path prefix for tests (e.g. `/api/v1`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Test application: server plus the resources it owns.
pub struct TestApp {
    pub server: TestServer,
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(ScriptedExtractor::returning(json!({}))).await
}

/// Setup test app with an extractor that answers every call the same way.
pub async fn setup_test_app_with(extractor: ScriptedExtractor) -> TestApp {
    let temp_dir = TempDir::new().expect("temp dir");
    let storage = LocalStorage::new(temp_dir.path(), "http://localhost:3000/files".to_string())
        .await
        .expect("local storage");

    let store = MemoryStore::with_default_categories();
    let shared = Arc::new(store.clone());
    let stores = Stores {
        users: shared.clone(),
        organizations: shared.clone(),
        members: shared.clone(),
        categories: shared.clone(),
        expenses: shared,
    };
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    ));

    let settings = ServiceSettings {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        category_cache_ttl: Duration::from_secs(300),
        flag_amount_threshold: None,
        invite_code_ttl_days: 7,
        export_currency_format: "#,##0".to_string(),
        intake: IntakeSettings {
            max_file_size_bytes: 1024 * 1024,
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
            ],
            fetch_timeout: Duration::from_secs(5),
        },
    };

    let extractor: Arc<dyn ReceiptExtractor> = Arc::new(extractor);
    let state = build_state(
        None,
        stores,
        Arc::new(storage),
        extractor,
        clock.clone(),
        settings,
    )
    .expect("app state");

    let router = build_router(
        state,
        HttpSettings {
            cors_origins: vec!["*".to_string()],
            body_limit: 4 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
        },
    )
    .expect("router");

    TestApp {
        server: TestServer::new(router).expect("test server"),
        store,
        clock,
        _temp_dir: temp_dir,
    }
}

/// `data` of a success envelope.
pub fn data(body: &Value) -> &Value {
    assert_eq!(body["success"], true, "expected success envelope: {}", body);
    &body["data"]
}
