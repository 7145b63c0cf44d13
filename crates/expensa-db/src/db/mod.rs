//! Database repositories for the data access layer
//!
//! Each repository owns one table (members and organizations share a transaction for
//! creation) and returns `AppError` so callers can propagate with `?`.

pub mod categories;
pub mod expenses;
pub mod members;
pub mod organizations;
pub mod transaction;
pub mod users;

pub use categories::CategoryRepository;
pub use expenses::ExpenseRepository;
pub use members::MemberRepository;
pub use organizations::OrganizationRepository;
pub use users::UserRepository;
