//! Expensa Infrastructure Library
//!
//! Shared infrastructure for the Expensa binaries:
//! - Middleware (request ID, security headers)
//! - Telemetry initialization
//! - The JSON response envelope

#[cfg(feature = "middleware")]
pub mod middleware;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub mod error;

#[cfg(feature = "middleware")]
pub use middleware::{
    get_request_id, request_id_middleware, security_headers_middleware, RequestId,
};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};

pub use error::{ErrorResponse, SuccessResponse};
