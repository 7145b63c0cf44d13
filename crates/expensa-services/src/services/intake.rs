//! Receipt intake: upload a receipt image, then run it through extraction and record the
//! resulting expense.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::{Bytes, BytesMut};
use expensa_core::models::{ExtractRequest, ExtractResponse, UploadResponse};
use expensa_core::policy::{Action, Resource};
use expensa_core::validation::{extension_for_content_type, validate_image_content_type};
use expensa_core::{AppError, Clock};
use expensa_storage::keys::key_belongs_to;
use expensa_storage::Storage;
use uuid::Uuid;
use validator::Validate;

use super::access::{AccessControl, Actor};
use super::expenses::ExpenseService;
use super::extraction::{ReceiptExtractor, ReceiptImage};

/// A receipt file as received from the client.
#[derive(Debug, Clone)]
pub struct ReceiptUpload {
    pub content_type: String,
    pub data: Bytes,
}

impl ReceiptUpload {
    /// Parse `data:<mime>;base64,<payload>`.
    pub fn from_data_uri(uri: &str) -> Result<Self, AppError> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| AppError::InvalidInput("image must be a data URI".to_string()))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| AppError::InvalidInput("Malformed data URI".to_string()))?;
        let content_type = meta
            .strip_suffix(";base64")
            .ok_or_else(|| AppError::InvalidInput("data URI must be base64 encoded".to_string()))?;
        let data = STANDARD
            .decode(payload.trim())
            .map_err(|e| AppError::InvalidInput(format!("Invalid base64 image data: {}", e)))?;
        Ok(Self {
            content_type: content_type.to_string(),
            data: Bytes::from(data),
        })
    }
}

#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub max_file_size_bytes: usize,
    pub allowed_content_types: Vec<String>,
    /// Timeout for fetching a receipt by URL.
    pub fetch_timeout: Duration,
}

fn content_type_for_key(key: &str) -> &'static str {
    match key.rsplit('.').next().map(str::to_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

pub struct IntakeService {
    storage: Arc<dyn Storage>,
    extractor: Arc<dyn ReceiptExtractor>,
    expenses: Arc<ExpenseService>,
    access: AccessControl,
    clock: Arc<dyn Clock>,
    http: reqwest::Client,
    settings: IntakeSettings,
}

impl IntakeService {
    pub fn new(
        storage: Arc<dyn Storage>,
        extractor: Arc<dyn ReceiptExtractor>,
        expenses: Arc<ExpenseService>,
        access: AccessControl,
        clock: Arc<dyn Clock>,
        settings: IntakeSettings,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.fetch_timeout)
            .build()
            .context("Failed to create HTTP client for receipt downloads")?;
        Ok(Self {
            storage,
            extractor,
            expenses,
            access,
            clock,
            http,
            settings,
        })
    }

    fn check_limit(&self, len: usize) -> Result<(), AppError> {
        if len > self.settings.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Receipt is at least {} bytes; the limit is {} bytes",
                len, self.settings.max_file_size_bytes
            )));
        }
        Ok(())
    }

    fn check_size(&self, len: usize) -> Result<(), AppError> {
        if len == 0 {
            return Err(AppError::InvalidInput("Receipt file is empty".to_string()));
        }
        self.check_limit(len)
    }

    /// Store a receipt image under the organization's prefix.
    #[tracing::instrument(skip(self, upload), fields(user_id = %actor.user_id, bytes = upload.data.len()))]
    pub async fn upload(
        &self,
        actor: &Actor,
        organization_id: Uuid,
        upload: ReceiptUpload,
    ) -> Result<UploadResponse, AppError> {
        self.access
            .authorize(
                actor,
                organization_id,
                Action::UploadReceipt,
                &Resource::Organization { id: organization_id },
            )
            .await?;

        self.check_size(upload.data.len())?;
        let content_type =
            validate_image_content_type(&upload.content_type, &self.settings.allowed_content_types)?;
        let filename = format!(
            "{}.{}",
            Uuid::new_v4(),
            extension_for_content_type(&content_type)
        );

        let (path, image_url) = self
            .storage
            .upload(organization_id, &filename, &content_type, upload.data.to_vec())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, organization_id = %organization_id, "Receipt upload failed");
                AppError::from(e)
            })?;

        tracing::info!(organization_id = %organization_id, path = %path, "Receipt uploaded");
        Ok(UploadResponse { image_url, path })
    }

    async fn load_key(&self, organization_id: Uuid, key: &str) -> Result<ReceiptImage, AppError> {
        if !key_belongs_to(organization_id, key) {
            return Err(AppError::InvalidInput(
                "Receipt path does not belong to this organization".to_string(),
            ));
        }
        let data = self.storage.download(key).await?;
        Ok(ReceiptImage {
            data: Bytes::from(data),
            media_type: content_type_for_key(key).to_string(),
        })
    }

    async fn fetch_url(&self, url: &str) -> Result<ReceiptImage, AppError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| AppError::InvalidInput(format!("Invalid image_url: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::InvalidInput(
                "image_url must use http or https".to_string(),
            ));
        }

        let mut response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(|e| AppError::BadRequest(format!("Could not fetch image_url: {}", e)))?;
        if !response.status().is_success() {
            return Err(AppError::BadRequest(format!(
                "Fetching image_url returned {}",
                response.status()
            )));
        }

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(declared) = response.content_length() {
            self.check_limit(usize::try_from(declared).unwrap_or(usize::MAX))?;
        }

        // Content-Length may be absent or wrong; stop reading once past the limit.
        let mut data = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::BadRequest(format!("Could not read image_url body: {}", e)))?
        {
            self.check_limit(data.len() + chunk.len())?;
            data.extend_from_slice(&chunk);
        }
        self.check_size(data.len())?;
        let data = data.freeze();

        let media_type = match header_type {
            Some(ct) => validate_image_content_type(&ct, &self.settings.allowed_content_types)?,
            None => content_type_for_key(url).to_string(),
        };
        Ok(ReceiptImage { data, media_type })
    }

    /// Resolve the image for `request`: an uploaded path, a URL this deployment's storage
    /// produced, or any other http(s) URL. Returns the image and the URL to keep on the
    /// expense.
    async fn resolve_image(
        &self,
        request: &ExtractRequest,
    ) -> Result<(ReceiptImage, Option<String>), AppError> {
        let organization_id = request.organization_id;
        if let Some(path) = request.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            let image = self.load_key(organization_id, path).await?;
            let url = request
                .image_url
                .clone()
                .unwrap_or_else(|| self.storage.url_for_key(path));
            return Ok((image, Some(url)));
        }

        let url = request
            .image_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::InvalidInput("Either path or image_url is required".to_string()))?;

        let image = match self.storage.key_for_url(url) {
            Some(key) => self.load_key(organization_id, &key).await?,
            None => self.fetch_url(url).await?,
        };
        Ok((image, Some(url.to_string())))
    }

    /// Extract a receipt and record it as a new expense.
    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id, organization_id = %request.organization_id))]
    pub async fn extract(&self, actor: &Actor, request: ExtractRequest) -> Result<ExtractResponse, AppError> {
        request.validate()?;
        let organization_id = request.organization_id;
        self.access
            .authorize(
                actor,
                organization_id,
                Action::CreateExpense,
                &Resource::Organization { id: organization_id },
            )
            .await?;

        let (image, image_url) = self.resolve_image(&request).await?;
        let extraction = self.extractor.extract(image, self.clock.today()).await?;
        let expense = self
            .expenses
            .record_extraction(actor, organization_id, image_url, &extraction)
            .await?;

        Ok(ExtractResponse {
            expense,
            extracted_data: extraction.receipt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{Fixture, ScriptedExtractor};
    use expensa_core::models::{ExpenseStatus, Role};
    use expensa_core::ErrorMetadata;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::io::Write;

    fn jpeg() -> ReceiptUpload {
        ReceiptUpload {
            content_type: "image/jpeg".to_string(),
            data: Bytes::from_static(b"\xFF\xD8\xFFreceipt"),
        }
    }

    #[test]
    fn data_uri_parsing() {
        let upload = ReceiptUpload::from_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(upload.content_type, "image/png");
        assert_eq!(&upload.data[..], b"hello");
        assert!(ReceiptUpload::from_data_uri("image/png;base64,aGVsbG8=").is_err());
        assert!(ReceiptUpload::from_data_uri("data:image/png,hello").is_err());
    }

    #[tokio::test]
    async fn upload_stores_under_organization_prefix() {
        let fx = Fixture::new().await;
        let response = fx.intake.upload(&fx.owner, fx.org, jpeg()).await.unwrap();
        assert!(response.path.starts_with(&format!("receipts/{}/", fx.org)));
        assert!(response.path.ends_with(".jpg"));
        assert!(fx.storage.exists(&response.path).await.unwrap());
    }

    #[tokio::test]
    async fn upload_rejects_bad_type_and_empty_file() {
        let fx = Fixture::new().await;
        let pdf = ReceiptUpload {
            content_type: "application/pdf".to_string(),
            data: Bytes::from_static(b"%PDF"),
        };
        let err = fx.intake.upload(&fx.owner, fx.org, pdf).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let empty = ReceiptUpload {
            content_type: "image/png".to_string(),
            data: Bytes::new(),
        };
        let err = fx.intake.upload(&fx.owner, fx.org, empty).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let fx = Fixture::new().await;
        let big = ReceiptUpload {
            content_type: "image/jpeg".to_string(),
            data: Bytes::from(vec![0xFF; 1024 * 1024 + 1]),
        };
        let err = fx.intake.upload(&fx.owner, fx.org, big).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        assert_eq!(err.http_status_code(), 413);
    }

    #[tokio::test]
    async fn oversized_remote_image_is_not_buffered() {
        let mut server = mockito::Server::new_async().await;
        let declared = server
            .mock("GET", "/declared.jpg")
            .with_header("content-type", "image/jpeg")
            .with_body(vec![0xFF; 1024 * 1024 + 1])
            .create_async()
            .await;
        let streamed = server
            .mock("GET", "/streamed.jpg")
            .with_header("content-type", "image/jpeg")
            .with_chunked_body(|w| {
                for _ in 0..64 {
                    w.write_all(&[0xFF; 32 * 1024])?;
                }
                Ok(())
            })
            .create_async()
            .await;

        let fx = Fixture::new().await;
        for path in ["/declared.jpg", "/streamed.jpg"] {
            let err = fx
                .intake
                .extract(
                    &fx.owner,
                    ExtractRequest {
                        organization_id: fx.org,
                        image_url: Some(format!("{}{}", server.url(), path)),
                        path: None,
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::PayloadTooLarge(_)), "{}: {:?}", path, err);
        }
        declared.assert_async().await;
        streamed.assert_async().await;
        assert!(fx.approvals.queue(&fx.owner, fx.org).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_image_within_limit_is_extracted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/small.png")
            .with_header("content-type", "image/png")
            .with_body(b"\x89PNGreceipt")
            .create_async()
            .await;

        let fx = Fixture::with_extractor(ScriptedExtractor::returning(json!({
            "merchant_name": "Alfamart",
            "amount": 12000
        })))
        .await;
        let url = format!("{}/small.png", server.url());
        let response = fx
            .intake
            .extract(
                &fx.owner,
                ExtractRequest {
                    organization_id: fx.org,
                    image_url: Some(url.clone()),
                    path: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(response.expense.merchant_name, "Alfamart");
        assert_eq!(response.expense.image_url.as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn viewer_cannot_upload() {
        let fx = Fixture::new().await;
        let viewer = fx.join_as(Role::Viewer).await;
        let err = fx.intake.upload(&viewer, fx.org, jpeg()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn upload_then_extract_records_draft() {
        let fx = Fixture::with_extractor(ScriptedExtractor::returning(json!({
            "merchant_name": "Indomaret",
            "amount": 23500,
            "date": "2024-03-01"
        })))
        .await;
        let uploaded = fx.intake.upload(&fx.owner, fx.org, jpeg()).await.unwrap();

        let response = fx
            .intake
            .extract(
                &fx.owner,
                ExtractRequest {
                    organization_id: fx.org,
                    image_url: None,
                    path: Some(uploaded.path.clone()),
                },
            )
            .await
            .unwrap();

        let expense = response.expense;
        assert_eq!(expense.status, ExpenseStatus::Draft);
        assert_eq!(expense.merchant_name, "Indomaret");
        assert_eq!(expense.amount, Decimal::from(23_500));
        assert_eq!(expense.category, "Groceries");
        assert_eq!(expense.image_url.as_deref(), Some(uploaded.image_url.as_str()));
        assert_eq!(expense.raw_extraction.unwrap()["amount"], 23500);
    }

    #[tokio::test]
    async fn negative_extracted_amount_is_made_positive() {
        let fx = Fixture::with_extractor(ScriptedExtractor::returning(json!({
            "merchant_name": "Toko Sinar",
            "amount": -50000
        })))
        .await;
        let uploaded = fx.intake.upload(&fx.owner, fx.org, jpeg()).await.unwrap();
        let response = fx
            .intake
            .extract(
                &fx.owner,
                ExtractRequest {
                    organization_id: fx.org,
                    image_url: Some(uploaded.image_url),
                    path: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(response.expense.amount, Decimal::from(50_000));
        assert_eq!(response.expense.category, "Other");
        assert_eq!(response.expense.date, fx.clock.today());
    }

    #[tokio::test]
    async fn foreign_path_is_rejected() {
        let fx = Fixture::new().await;
        let err = fx
            .intake
            .extract(
                &fx.owner,
                ExtractRequest {
                    organization_id: fx.org,
                    image_url: None,
                    path: Some(format!("receipts/{}/x.jpg", Uuid::new_v4())),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn extraction_failure_records_nothing() {
        let fx = Fixture::with_extractor(ScriptedExtractor::failing()).await;
        let uploaded = fx.intake.upload(&fx.owner, fx.org, jpeg()).await.unwrap();
        let err = fx
            .intake
            .extract(
                &fx.owner,
                ExtractRequest {
                    organization_id: fx.org,
                    image_url: None,
                    path: Some(uploaded.path),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Extraction(_)));

        let queue = fx.approvals.queue(&fx.owner, fx.org).await.unwrap();
        assert!(queue.is_empty());
    }
}
