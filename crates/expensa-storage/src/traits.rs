//! Storage abstraction trait

use crate::StorageBackend;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for expensa_core::AppError {
    fn from(err: StorageError) -> Self {
        use expensa_core::AppError;
        match err {
            StorageError::UploadFailed(msg) => AppError::UploadFailed(msg),
            StorageError::NotFound(key) => AppError::NotFound(format!("Receipt {} not found", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// Every backend writes receipts under `receipts/{organization_id}/{filename}`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload a file and return (storage_key, public_url)
    async fn upload(
        &self,
        organization_id: Uuid,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)>;

    /// Download a file by its storage key
    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Delete a file by its storage key. Deleting a missing key succeeds.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Check if a file exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Public URL of a stored key.
    fn url_for_key(&self, storage_key: &str) -> String;

    /// Storage key for a public URL this backend produced, if it is one.
    fn key_for_url(&self, url: &str) -> Option<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
