//! Expensa API Library
//!
//! HTTP handlers, JWT authentication and application setup. The binary in `main.rs`
//! wires these against Postgres; integration tests wire the same router over the
//! in-memory stores.

pub mod api_doc;
pub mod auth;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;

pub use error::HttpAppError;
pub use state::AppState;
