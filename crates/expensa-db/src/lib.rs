//! Expensa database layer
//!
//! PostgreSQL repositories (sqlx) for users, organizations, memberships, categories and
//! expenses, plus the store traits the services depend on.

pub mod db;
#[cfg(feature = "memory")]
pub mod memory;
pub mod store_traits;

pub use db::organizations::NewOrganization;
pub use db::{
    CategoryRepository, ExpenseRepository, MemberRepository, OrganizationRepository,
    UserRepository,
};
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use store_traits::{CategoryStore, ExpenseStore, MemberStore, OrganizationStore, UserStore};

/// Migrations embedded from the workspace `migrations/` directory.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
