//! Receipt storage setup

use std::sync::Arc;

use anyhow::{Context, Result};
use expensa_core::Config;
use expensa_storage::{create_storage, Storage};

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let storage = create_storage(config)
        .await
        .context("Failed to initialize receipt storage")?;
    tracing::info!(backend = ?storage.backend_type(), "Receipt storage ready");
    Ok(storage)
}
