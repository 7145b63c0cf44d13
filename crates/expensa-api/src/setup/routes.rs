//! Route configuration and setup

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{delete, get, patch, post},
    Json, Router,
};
use expensa_core::Config;
use expensa_infra::{request_id_middleware, security_headers_middleware};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::constants::{API_PREFIX, BODY_LIMIT_OVERHEAD_BYTES, OPENAPI_PATH};
use crate::handlers;
use crate::state::AppState;

const HTTP_CONCURRENCY_LIMIT: usize = 10_000;

/// Transport-level limits applied around every route.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub cors_origins: Vec<String>,
    pub body_limit: usize,
    pub request_timeout: Duration,
}

impl HttpSettings {
    pub fn from_config(config: &Config) -> Self {
        // A data URI is base64, so the JSON upload body can be 4/3 of the file.
        let body_limit = config.receipt_max_file_size_bytes() * 2 + BODY_LIMIT_OVERHEAD_BYTES;
        // /extract must be able to exhaust its retries before the HTTP deadline fires.
        let extraction_budget = config.extraction_timeout() * (config.extraction_max_retries() + 1)
            + Duration::from_secs(5);
        Self {
            cors_origins: config.cors_origins().to_vec(),
            body_limit,
            request_timeout: config.request_timeout().max(extraction_budget),
        }
    }
}

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    build_router(state, HttpSettings::from_config(config))
}

pub fn build_router(state: Arc<AppState>, settings: HttpSettings) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(&settings.cors_origins)?;

    let protected = protected_routes().route_layer(axum::middleware::from_fn_with_state(
        state.jwt.clone(),
        auth_middleware,
    ));

    tracing::info!(
        body_limit = settings.body_limit,
        request_timeout_secs = settings.request_timeout.as_secs(),
        "HTTP limits configured"
    );

    let app = public_routes()
        .merge(protected)
        .merge(utoipa_rapidoc::RapiDoc::new(OPENAPI_PATH).path("/docs"))
        .layer(ConcurrencyLimitLayer::new(HTTP_CONCURRENCY_LIMIT))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(settings.body_limit))
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .with_state(state);

    Ok(app)
}

fn setup_cors(origins: &[String]) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any));
    }

    let origins = origins
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(Any))
}

fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(&format!("{}/health", API_PREFIX), get(handlers::health::liveness))
        .route(
            &format!("{}/health/ready", API_PREFIX),
            get(handlers::health::readiness),
        )
        .route(
            OPENAPI_PATH,
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
}

fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(user_routes())
        .merge(organization_routes())
        .merge(expense_routes())
        .merge(receipt_routes())
}

fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/users", API_PREFIX),
            post(handlers::users::upsert_profile),
        )
        .route(&format!("{}/users/me", API_PREFIX), get(handlers::users::me))
}

fn organization_routes() -> Router<Arc<AppState>> {
    use handlers::{approvals, categories, members, organizations};

    Router::new()
        .route(
            &format!("{}/organizations", API_PREFIX),
            post(organizations::create_organization).get(organizations::list_organizations),
        )
        .route(
            &format!("{}/organizations/join", API_PREFIX),
            post(organizations::join_organization),
        )
        .route(
            &format!("{}/organizations/{{id}}", API_PREFIX),
            get(organizations::get_organization)
                .patch(organizations::update_organization)
                .delete(organizations::delete_organization),
        )
        .route(
            &format!("{}/organizations/{{id}}/invite", API_PREFIX),
            post(organizations::regenerate_invite),
        )
        .route(
            &format!("{}/organizations/{{id}}/categories", API_PREFIX),
            post(organizations::add_category),
        )
        .route(
            &format!("{}/organizations/{{id}}/categories/{{name}}", API_PREFIX),
            delete(organizations::remove_category),
        )
        .route(
            &format!("{}/organizations/{{id}}/members", API_PREFIX),
            get(members::list_members).post(members::add_member),
        )
        .route(
            &format!("{}/organizations/{{id}}/members/{{user_id}}", API_PREFIX),
            patch(members::change_role).delete(members::remove_member),
        )
        .route(
            &format!("{}/organizations/{{id}}/approvals", API_PREFIX),
            get(approvals::approval_queue),
        )
        .route(
            &format!("{}/categories", API_PREFIX),
            get(categories::list_categories),
        )
}

fn expense_routes() -> Router<Arc<AppState>> {
    use handlers::{approvals, expenses, export};

    Router::new()
        .route(
            &format!("{}/expenses", API_PREFIX),
            post(expenses::create_expense)
                .get(expenses::get_expenses)
                .patch(expenses::update_expense)
                .delete(expenses::delete_expense),
        )
        .route(
            &format!("{}/expenses/{{id}}/approve", API_PREFIX),
            post(approvals::approve_expense),
        )
        .route(
            &format!("{}/expenses/{{id}}/flag", API_PREFIX),
            post(approvals::flag_expense),
        )
        .route(
            &format!("{}/expenses/{{id}}/reject", API_PREFIX),
            post(approvals::reject_expense),
        )
        .route(&format!("{}/export", API_PREFIX), get(export::export_expenses))
}

fn receipt_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/upload", API_PREFIX),
            post(handlers::receipts::upload_receipt),
        )
        .route(
            &format!("{}/extract", API_PREFIX),
            post(handlers::receipts::extract_receipt),
        )
}
