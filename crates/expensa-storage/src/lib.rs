//! Expensa Storage Library
//!
//! Receipt image storage behind the [`Storage`] trait, with S3 (via `object_store`) and
//! local filesystem backends.
//!
//! # Storage key format
//!
//! Keys are organization-scoped: `receipts/{organization_id}/{filename}`. Keys must not
//! contain `..` or a leading `/`. Key generation lives in the `keys` module so all backends
//! stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use expensa_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
