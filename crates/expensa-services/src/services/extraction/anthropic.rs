//! Anthropic Messages API receipt extractor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::NaiveDate;
use expensa_core::models::normalize_extraction;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{Extraction, ExtractionError, ReceiptExtractor, ReceiptImage};

const API_VERSION: &str = "2023-06-01";

const RECEIPT_PROMPT: &str = r#"You are reading a purchase receipt. Respond with ONLY a JSON object, no prose, with these fields:
{
  "merchant_name": string,
  "amount": number (the grand total paid),
  "currency": string (ISO 4217 code, e.g. "IDR"),
  "date": string (YYYY-MM-DD),
  "items": [{"name": string, "quantity": number, "price": number}],
  "description": string (one short line describing the purchase),
  "confidence": number between 0 and 1
}
Use null for any field you cannot read."#;

pub struct AnthropicReceiptExtractor {
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
    json_object: Regex,
}

impl std::fmt::Debug for AnthropicReceiptExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicReceiptExtractor")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

// Messages API request/response
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<MessageParam>,
}

#[derive(Debug, Serialize)]
struct MessageParam {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlockResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockResponse {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl AnthropicReceiptExtractor {
    /// `api_base` is the Messages API root, e.g. `https://api.anthropic.com/v1`.
    pub fn new(api_key: String, api_base: String, model: String, max_tokens: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client for receipt extraction")?;
        let json_object =
            Regex::new(r"(?s)\{.*\}").context("Failed to compile JSON object pattern")?;

        Ok(Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            max_tokens,
            client,
            json_object,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.api_base)
    }

    async fn call_messages(&self, image: &ReceiptImage) -> Result<String, ExtractionError> {
        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![MessageParam {
                role: "user".to_string(),
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            source_type: "base64".to_string(),
                            media_type: image.media_type.clone(),
                            data: STANDARD.encode(&image.data),
                        },
                    },
                    ContentBlock::Text {
                        text: RECEIPT_PROMPT.to_string(),
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("Messages API returned {}: {}", status, error_text);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ExtractionError::Transient(message)
            } else {
                ExtractionError::Upstream(message)
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Upstream(format!("Unreadable Messages API response: {}", e)))?;

        parsed
            .content
            .into_iter()
            .find_map(|b| match b {
                ContentBlockResponse::Text { text } => Some(text),
                ContentBlockResponse::Other => None,
            })
            .ok_or(ExtractionError::NoJson)
    }

    /// First `{` through last `}` of the model's text, parsed as JSON.
    fn parse_json_object(&self, text: &str) -> Result<Value, ExtractionError> {
        let found = self.json_object.find(text).ok_or(ExtractionError::NoJson)?;
        let value: Value = serde_json::from_str(found.as_str())
            .map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(ExtractionError::InvalidJson(
                "expected a JSON object".to_string(),
            ));
        }
        Ok(value)
    }
}

fn classify_send_error(err: reqwest::Error) -> ExtractionError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ExtractionError::Transient(err.to_string())
    } else {
        ExtractionError::Upstream(err.to_string())
    }
}

#[async_trait]
impl ReceiptExtractor for AnthropicReceiptExtractor {
    #[tracing::instrument(skip(self, image), fields(model = %self.model, bytes = image.data.len()))]
    async fn extract(
        &self,
        image: ReceiptImage,
        today: NaiveDate,
    ) -> Result<Extraction, ExtractionError> {
        let text = self.call_messages(&image).await?;
        let raw = self.parse_json_object(&text)?;
        let receipt = normalize_extraction(&raw, today);

        tracing::debug!(
            merchant = %receipt.merchant_name,
            amount = %receipt.amount,
            confidence = receipt.confidence,
            "Receipt extracted"
        );

        Ok(Extraction { receipt, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn extractor(base: &str) -> AnthropicReceiptExtractor {
        AnthropicReceiptExtractor::new(
            "test-key".to_string(),
            base.to_string(),
            "claude-test".to_string(),
            512,
        )
        .unwrap()
    }

    fn image() -> ReceiptImage {
        ReceiptImage {
            data: Bytes::from_static(b"\xFF\xD8\xFFfake-jpeg"),
            media_type: "image/jpeg".to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn text_response(text: &str) -> String {
        json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}]
        })
        .to_string()
    }

    #[test]
    fn json_is_located_inside_prose() {
        let ex = extractor("http://unused");
        let value = ex
            .parse_json_object("Here you go:\n```json\n{\"merchant_name\": \"Indomaret\"}\n```")
            .unwrap();
        assert_eq!(value["merchant_name"], "Indomaret");
        assert!(matches!(
            ex.parse_json_object("no braces here"),
            Err(ExtractionError::NoJson)
        ));
        assert!(matches!(
            ex.parse_json_object("{not json}"),
            Err(ExtractionError::InvalidJson(_))
        ));
    }

    #[tokio::test]
    async fn extracts_and_normalizes_receipt() {
        let mut server = mockito::Server::new_async().await;
        let body = text_response(
            r#"{"merchant_name":"Indomaret","amount":-23500,"currency":"idr","date":"2024-03-01","items":[{"name":"Milk","quantity":1,"price":23500}],"confidence":0.93}"#,
        );
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", API_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let result = extractor(&server.url()).extract(image(), today()).await.unwrap();
        mock.assert_async().await;

        assert_eq!(result.receipt.merchant_name, "Indomaret");
        assert_eq!(result.receipt.amount, Decimal::new(23500, 0));
        assert_eq!(result.receipt.currency, "IDR");
        assert_eq!(
            result.receipt.date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert_eq!(result.raw["amount"], -23500);
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/messages")
            .with_status(529)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = extractor(&server.url()).extract(image(), today()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Transient(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/messages")
            .with_status(400)
            .with_body(r#"{"error":"bad image"}"#)
            .create_async()
            .await;

        let err = extractor(&server.url()).extract(image(), today()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Upstream(_)));
        assert!(!err.is_retryable());
    }
}
