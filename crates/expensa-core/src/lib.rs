//! Expensa Core Library
//!
//! Domain models, error types, configuration, the authorization policy and the clock
//! abstraction shared by every Expensa crate.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod policy;
pub mod storage_types;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, BaseConfig, Config};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use policy::{Action, AuthorizationPolicy, Decision, Resource, RolePolicy, Subject};
pub use storage_types::StorageBackend;
