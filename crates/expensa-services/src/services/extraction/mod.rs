//! Receipt extraction: turning an image into structured expense fields with a hosted
//! vision model.

pub mod anthropic;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use expensa_core::models::ExtractedReceipt;
use expensa_core::AppError;
use serde_json::Value;
use thiserror::Error;

pub use anthropic::AnthropicReceiptExtractor;
pub use retry::RetryingExtractor;

/// Image bytes handed to the model.
#[derive(Debug, Clone)]
pub struct ReceiptImage {
    pub data: Bytes,
    pub media_type: String,
}

/// Normalized fields plus the model's JSON object as received.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub receipt: ExtractedReceipt,
    pub raw: Value,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transient model failure: {0}")]
    Transient(String),

    #[error("model request failed: {0}")]
    Upstream(String),

    #[error("model response contained no JSON object")]
    NoJson,

    #[error("model response is not valid JSON: {0}")]
    InvalidJson(String),
}

impl ExtractionError {
    /// Timeouts and transient upstream failures may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractionError::Timeout(_) | ExtractionError::Transient(_))
    }
}

impl From<ExtractionError> for AppError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Timeout(_) => AppError::ExtractionTimedOut(err.to_string()),
            other => AppError::Extraction(other.to_string()),
        }
    }
}

/// A model that reads receipts.
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    /// Extract fields from one receipt. `today` fills in a missing or unreadable date.
    async fn extract(
        &self,
        image: ReceiptImage,
        today: NaiveDate,
    ) -> Result<Extraction, ExtractionError>;
}
