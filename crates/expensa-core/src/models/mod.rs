//! Data models for the application, organized by domain.

mod category;
mod expense;
mod export;
mod extraction;
mod member;
mod organization;
mod user;

pub use category::*;
pub use expense::*;
pub use export::*;
pub use extraction::*;
pub use member::*;
pub use organization::*;
pub use user::*;
