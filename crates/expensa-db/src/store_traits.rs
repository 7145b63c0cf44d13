//! Store trait abstractions
//!
//! Services depend on these traits instead of the concrete repositories so they can run
//! against the in-memory implementations in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expensa_core::models::{
    Category, Expense, ExpenseChanges, ExpenseFilter, ExpenseOrder, ExpenseStatus,
    MemberWithUser, NewExpense, Organization, OrganizationMember, OrganizationSettings,
    OrganizationSummary, Role, User,
};
use expensa_core::AppError;
use uuid::Uuid;

use crate::db::organizations::NewOrganization;
use crate::db::{
    CategoryRepository, ExpenseRepository, MemberRepository, OrganizationRepository,
    UserRepository,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn upsert(
        &self,
        id: Uuid,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<User, AppError>;
    async fn get(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Atomically create the organization and its first owner membership.
    async fn create_with_owner(
        &self,
        new: NewOrganization,
    ) -> Result<(Organization, OrganizationMember), AppError>;
    async fn get(&self, id: Uuid) -> Result<Option<Organization>, AppError>;
    async fn find_by_invite_code(&self, code: &str) -> Result<Option<Organization>, AppError>;
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrganizationSummary>, AppError>;
    async fn update(
        &self,
        id: Uuid,
        name: Option<String>,
        settings: Option<OrganizationSettings>,
    ) -> Result<Organization, AppError>;
    async fn set_invite_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Organization, AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn get_role(&self, organization_id: Uuid, user_id: Uuid) -> Result<Option<Role>, AppError>;
    async fn list(&self, organization_id: Uuid) -> Result<Vec<MemberWithUser>, AppError>;
    /// Fails with `Conflict` when the user is already a member.
    async fn add(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, AppError>;
    /// Fails with `LastOwner` when demoting the only owner.
    async fn update_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, AppError>;
    /// Fails with `LastOwner` when removing the only owner.
    async fn remove(&self, organization_id: Uuid, user_id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// Global categories in stored listing order.
    async fn list(&self) -> Result<Vec<Category>, AppError>;
}

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn insert(&self, new: NewExpense) -> Result<Expense, AppError>;
    async fn get(&self, id: Uuid) -> Result<Option<Expense>, AppError>;
    async fn list(
        &self,
        filter: &ExpenseFilter,
        order: ExpenseOrder,
    ) -> Result<Vec<Expense>, AppError>;
    /// Apply `changes`, optionally only while the status is one of `only_if`.
    /// `None` when the expense is gone or in another status.
    async fn update(
        &self,
        id: Uuid,
        changes: ExpenseChanges,
        only_if: Option<&[ExpenseStatus]>,
    ) -> Result<Option<Expense>, AppError>;
    /// Conditional status change; `None` when the expense is gone or not in `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[ExpenseStatus],
        to: ExpenseStatus,
    ) -> Result<Option<Expense>, AppError>;
    async fn delete(&self, id: Uuid, only_if: Option<&[ExpenseStatus]>) -> Result<bool, AppError>;
}

// Implementations for the PostgreSQL repositories

#[async_trait]
impl UserStore for UserRepository {
    async fn upsert(
        &self,
        id: Uuid,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<User, AppError> {
        UserRepository::upsert(self, id, email, display_name).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>, AppError> {
        UserRepository::get(self, id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        UserRepository::find_by_email(self, email).await
    }
}

#[async_trait]
impl OrganizationStore for OrganizationRepository {
    async fn create_with_owner(
        &self,
        new: NewOrganization,
    ) -> Result<(Organization, OrganizationMember), AppError> {
        OrganizationRepository::create_with_owner(self, new).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Organization>, AppError> {
        OrganizationRepository::get(self, id).await
    }

    async fn find_by_invite_code(&self, code: &str) -> Result<Option<Organization>, AppError> {
        OrganizationRepository::find_by_invite_code(self, code).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrganizationSummary>, AppError> {
        OrganizationRepository::list_for_user(self, user_id).await
    }

    async fn update(
        &self,
        id: Uuid,
        name: Option<String>,
        settings: Option<OrganizationSettings>,
    ) -> Result<Organization, AppError> {
        OrganizationRepository::update(self, id, name, settings).await
    }

    async fn set_invite_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Organization, AppError> {
        OrganizationRepository::set_invite_code(self, id, code, expires_at).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        OrganizationRepository::delete(self, id).await
    }
}

#[async_trait]
impl MemberStore for MemberRepository {
    async fn get_role(&self, organization_id: Uuid, user_id: Uuid) -> Result<Option<Role>, AppError> {
        MemberRepository::get_role(self, organization_id, user_id).await
    }

    async fn list(&self, organization_id: Uuid) -> Result<Vec<MemberWithUser>, AppError> {
        MemberRepository::list(self, organization_id).await
    }

    async fn add(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, AppError> {
        MemberRepository::add(self, organization_id, user_id, role).await
    }

    async fn update_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, AppError> {
        MemberRepository::update_role(self, organization_id, user_id, role).await
    }

    async fn remove(&self, organization_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        MemberRepository::remove(self, organization_id, user_id).await
    }
}

#[async_trait]
impl CategoryStore for CategoryRepository {
    async fn list(&self) -> Result<Vec<Category>, AppError> {
        CategoryRepository::list(self).await
    }
}

#[async_trait]
impl ExpenseStore for ExpenseRepository {
    async fn insert(&self, new: NewExpense) -> Result<Expense, AppError> {
        ExpenseRepository::insert(self, new).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Expense>, AppError> {
        ExpenseRepository::get(self, id).await
    }

    async fn list(
        &self,
        filter: &ExpenseFilter,
        order: ExpenseOrder,
    ) -> Result<Vec<Expense>, AppError> {
        ExpenseRepository::list(self, filter, order).await
    }

    async fn update(
        &self,
        id: Uuid,
        changes: ExpenseChanges,
        only_if: Option<&[ExpenseStatus]>,
    ) -> Result<Option<Expense>, AppError> {
        ExpenseRepository::update(self, id, changes, only_if).await
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[ExpenseStatus],
        to: ExpenseStatus,
    ) -> Result<Option<Expense>, AppError> {
        ExpenseRepository::transition_status(self, id, from, to).await
    }

    async fn delete(&self, id: Uuid, only_if: Option<&[ExpenseStatus]>) -> Result<bool, AppError> {
        ExpenseRepository::delete(self, id, only_if).await
    }
}
