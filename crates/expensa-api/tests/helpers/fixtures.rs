use async_trait::async_trait;
use chrono::NaiveDate;
use expensa_core::models::normalize_extraction;
use expensa_services::{Extraction, ExtractionError, ReceiptExtractor, ReceiptImage};
use serde_json::Value;

/// Stands in for the vision model.
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
    async fn extract(
        &self,
        _image: ReceiptImage,
        today: NaiveDate,
    ) -> Result<Extraction, ExtractionError> {
        match &self.response {
            Some(raw) => Ok(Extraction {
                receipt: normalize_extraction(raw, today),
                raw: raw.clone(),
            }),
            None => Err(ExtractionError::Upstream("model unavailable".to_string())),
        }
    }
}

/// Bytes that start like a JPEG; storage and extraction never decode them.
pub fn receipt_jpeg() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend_from_slice(b"receipt body");
    bytes
}
