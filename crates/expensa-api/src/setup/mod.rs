//! Application setup and initialization
//!
//! Everything `main` needs: database, storage, services and the router. The pieces are
//! public so integration tests can assemble the same router over in-memory stores.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use expensa_core::{Config, SystemClock};
use expensa_infra::LogFormat;

use crate::constants::SERVICE_NAME;
use crate::state::AppState;

/// Initialize the entire application
pub async fn initialize_app(config: &Config) -> Result<(Arc<AppState>, axum::Router)> {
    let log_format: LogFormat = config
        .log_format()
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    expensa_infra::init_telemetry(SERVICE_NAME, log_format)
        .context("Failed to initialize tracing")?;

    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let pool = database::setup_database(config).await?;
    let storage = storage::setup_storage(config).await?;
    let extractor = services::build_extractor(config)?;

    let state = services::build_state(
        Some(pool.clone()),
        services::Stores::postgres(&pool),
        storage,
        extractor,
        Arc::new(SystemClock),
        services::ServiceSettings::from_config(config),
    )?;

    let router = routes::setup_routes(config, state.clone())?;
    Ok((state, router))
}
