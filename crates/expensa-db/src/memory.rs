//! In-memory store implementations
//!
//! Mirrors the PostgreSQL repositories closely enough for service and HTTP tests: unique
//! slugs and emails, the last-owner rule, cascading organization deletes and conditional
//! status transitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expensa_core::models::{
    Category, Expense, ExpenseChanges, ExpenseFilter, ExpenseOrder, ExpenseStatus,
    MemberWithUser, NewExpense, Organization, OrganizationMember, OrganizationSettings,
    OrganizationSummary, Role, User,
};
use expensa_core::AppError;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::organizations::NewOrganization;
use crate::store_traits::{CategoryStore, ExpenseStore, MemberStore, OrganizationStore, UserStore};

/// Global categories seeded by the initial migration, in listing order.
pub const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Food",
        &["restaurant", "cafe", "coffee", "kopi", "bakery", "warung", "pizza", "burger", "mcdonald", "kfc", "starbucks"],
    ),
    (
        "Transport",
        &["grab", "gojek", "uber", "taxi", "parking", "toll", "fuel", "pertamina", "shell", "gas station"],
    ),
    (
        "Groceries",
        &["supermarket", "mart", "indomaret", "alfamart", "grocery", "market", "hypermart"],
    ),
    (
        "Office Supplies",
        &["stationery", "office", "gramedia", "printer", "paper", "ink"],
    ),
    (
        "Utilities",
        &["electric", "pln", "water", "internet", "telkom", "phone", "pulsa"],
    ),
    (
        "Travel",
        &["hotel", "airline", "garuda", "airasia", "lion air", "traveloka", "booking", "airbnb"],
    ),
    (
        "Entertainment",
        &["cinema", "xxi", "cgv", "netflix", "spotify", "karaoke", "concert"],
    ),
    (
        "Health",
        &["pharmacy", "apotek", "clinic", "hospital", "kimia farma", "guardian", "doctor"],
    ),
];

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    members: Vec<OrganizationMember>,
    categories: Vec<Category>,
    expenses: HashMap<Uuid, Expense>,
}

/// Shared in-memory store implementing every store trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    category_reads: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the same global categories as the initial migration.
    pub fn with_default_categories() -> Self {
        let now = Utc::now();
        let categories = DEFAULT_CATEGORIES
            .iter()
            .enumerate()
            .map(|(i, (name, keywords))| Category {
                id: Uuid::new_v4(),
                name: name.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                sort_order: (i as i32 + 1) * 10,
                created_at: now,
            })
            .collect();
        MemoryStore {
            state: Arc::new(RwLock::new(State {
                categories,
                ..State::default()
            })),
            category_reads: Arc::default(),
        }
    }

    pub async fn set_categories(&self, categories: Vec<Category>) {
        self.state.write().await.categories = categories;
    }

    /// How many times the category table has been read.
    pub fn category_reads(&self) -> usize {
        self.category_reads.load(Ordering::SeqCst)
    }

    /// Overwrite `created_at` of an expense, for ordering tests.
    pub async fn set_expense_created_at(&self, id: Uuid, created_at: DateTime<Utc>) {
        if let Some(expense) = self.state.write().await.expenses.get_mut(&id) {
            expense.created_at = created_at;
        }
    }

    /// Force the invite code expiry of an organization.
    pub async fn set_invite_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) {
        if let Some(org) = self.state.write().await.organizations.get_mut(&id) {
            org.invite_code_expires_at = Some(expires_at);
        }
    }
}

impl State {
    fn member_mut(&mut self, organization_id: Uuid, user_id: Uuid) -> Option<&mut OrganizationMember> {
        self.members
            .iter_mut()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
    }

    fn ensure_not_last_owner(&self, organization_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        let current = self
            .members
            .iter()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} is not a member", user_id)))?;

        if current.role == Role::Owner {
            let owners = self
                .members
                .iter()
                .filter(|m| m.organization_id == organization_id && m.role == Role::Owner)
                .count();
            if owners <= 1 {
                return Err(AppError::LastOwner(
                    "An organization must keep at least one owner".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert(
        &self,
        id: Uuid,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<User, AppError> {
        let mut state = self.state.write().await;
        let taken = state
            .users
            .values()
            .any(|u| u.id != id && u.email.eq_ignore_ascii_case(email));
        if taken {
            return Err(AppError::Conflict(format!(
                "Email {} is already registered",
                email
            )));
        }

        let now = Utc::now();
        let user = state.users.entry(id).or_insert_with(|| User {
            id,
            email: email.to_string(),
            display_name: None,
            created_at: now,
            updated_at: now,
        });
        user.email = email.to_string();
        if let Some(name) = display_name {
            user.display_name = Some(name.to_string());
        }
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn create_with_owner(
        &self,
        new: NewOrganization,
    ) -> Result<(Organization, OrganizationMember), AppError> {
        let mut state = self.state.write().await;
        if state.organizations.values().any(|o| o.slug == new.slug) {
            return Err(AppError::Conflict(format!(
                "Organization slug '{}' is already taken",
                new.slug
            )));
        }

        let now = Utc::now();
        let organization = Organization {
            id: Uuid::new_v4(),
            name: new.name,
            slug: new.slug,
            settings: OrganizationSettings::default(),
            invite_code: Some(new.invite_code),
            invite_code_expires_at: Some(new.invite_code_expires_at),
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        let owner = OrganizationMember {
            organization_id: organization.id,
            user_id: new.created_by,
            role: Role::Owner,
            joined_at: now,
        };
        state.organizations.insert(organization.id, organization.clone());
        state.members.push(owner.clone());
        Ok((organization, owner))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Organization>, AppError> {
        Ok(self.state.read().await.organizations.get(&id).cloned())
    }

    async fn find_by_invite_code(&self, code: &str) -> Result<Option<Organization>, AppError> {
        Ok(self
            .state
            .read()
            .await
            .organizations
            .values()
            .find(|o| o.invite_code.as_deref() == Some(code))
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrganizationSummary>, AppError> {
        let state = self.state.read().await;
        let mut summaries: Vec<OrganizationSummary> = state
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                state.organizations.get(&m.organization_id).map(|o| OrganizationSummary {
                    id: o.id,
                    name: o.name.clone(),
                    slug: o.slug.clone(),
                    role: m.role,
                    joined_at: m.joined_at,
                })
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn update(
        &self,
        id: Uuid,
        name: Option<String>,
        settings: Option<OrganizationSettings>,
    ) -> Result<Organization, AppError> {
        let mut state = self.state.write().await;
        let org = state
            .organizations
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", id)))?;
        if let Some(name) = name {
            org.name = name;
        }
        if let Some(settings) = settings {
            org.settings = settings;
        }
        org.updated_at = Utc::now();
        Ok(org.clone())
    }

    async fn set_invite_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Organization, AppError> {
        let mut state = self.state.write().await;
        let org = state
            .organizations
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", id)))?;
        org.invite_code = Some(code.to_string());
        org.invite_code_expires_at = Some(expires_at);
        org.updated_at = Utc::now();
        Ok(org.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if state.organizations.remove(&id).is_none() {
            return Ok(false);
        }
        state.members.retain(|m| m.organization_id != id);
        state.expenses.retain(|_, e| e.organization_id != id);
        Ok(true)
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn get_role(&self, organization_id: Uuid, user_id: Uuid) -> Result<Option<Role>, AppError> {
        Ok(self
            .state
            .read()
            .await
            .members
            .iter()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .map(|m| m.role))
    }

    async fn list(&self, organization_id: Uuid) -> Result<Vec<MemberWithUser>, AppError> {
        let state = self.state.read().await;
        let mut members: Vec<MemberWithUser> = state
            .members
            .iter()
            .filter(|m| m.organization_id == organization_id)
            .filter_map(|m| {
                state.users.get(&m.user_id).map(|u| MemberWithUser {
                    user_id: m.user_id,
                    email: u.email.clone(),
                    display_name: u.display_name.clone(),
                    role: m.role,
                    joined_at: m.joined_at,
                })
            })
            .collect();
        members.sort_by_key(|m| m.joined_at);
        Ok(members)
    }

    async fn add(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, AppError> {
        let mut state = self.state.write().await;
        if state.member_mut(organization_id, user_id).is_some() {
            return Err(AppError::Conflict(
                "User is already a member of this organization".to_string(),
            ));
        }
        let member = OrganizationMember {
            organization_id,
            user_id,
            role,
            joined_at: Utc::now(),
        };
        state.members.push(member.clone());
        Ok(member)
    }

    async fn update_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, AppError> {
        let mut state = self.state.write().await;
        if role != Role::Owner {
            state.ensure_not_last_owner(organization_id, user_id)?;
        }
        let member = state
            .member_mut(organization_id, user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} is not a member", user_id)))?;
        member.role = role;
        Ok(member.clone())
    }

    async fn remove(&self, organization_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.ensure_not_last_owner(organization_id, user_id)?;
        state
            .members
            .retain(|m| !(m.organization_id == organization_id && m.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Category>, AppError> {
        self.category_reads.fetch_add(1, Ordering::SeqCst);
        let mut categories = self.state.read().await.categories.clone();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(categories)
    }
}

#[async_trait]
impl ExpenseStore for MemoryStore {
    async fn insert(&self, new: NewExpense) -> Result<Expense, AppError> {
        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4(),
            organization_id: new.organization_id,
            created_by: new.created_by,
            image_url: new.image_url,
            merchant_name: new.merchant_name,
            amount: new.amount.round_dp(2),
            currency: new.currency,
            category: new.category,
            date: new.date,
            description: new.description,
            items: new.items,
            status: new.status,
            confidence: new.confidence,
            raw_extraction: new.raw_extraction,
            created_at: now,
            updated_at: now,
        };
        self.state
            .write()
            .await
            .expenses
            .insert(expense.id, expense.clone());
        Ok(expense)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Expense>, AppError> {
        Ok(self.state.read().await.expenses.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &ExpenseFilter,
        order: ExpenseOrder,
    ) -> Result<Vec<Expense>, AppError> {
        let mut expenses: Vec<Expense> = self
            .state
            .read()
            .await
            .expenses
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        order.sort(&mut expenses);
        Ok(expenses)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: ExpenseChanges,
        only_if: Option<&[ExpenseStatus]>,
    ) -> Result<Option<Expense>, AppError> {
        let mut state = self.state.write().await;
        let Some(expense) = state.expenses.get_mut(&id) else {
            return Ok(None);
        };
        if only_if.is_some_and(|statuses| !statuses.contains(&expense.status)) {
            return Ok(None);
        }
        if let Some(v) = changes.merchant_name {
            expense.merchant_name = v;
        }
        if let Some(v) = changes.amount {
            expense.amount = v.round_dp(2);
        }
        if let Some(v) = changes.currency {
            expense.currency = v;
        }
        if let Some(v) = changes.category {
            expense.category = v;
        }
        if let Some(v) = changes.date {
            expense.date = v;
        }
        if let Some(v) = changes.description {
            expense.description = Some(v);
        }
        if let Some(v) = changes.items {
            expense.items = v;
        }
        expense.updated_at = Utc::now();
        Ok(Some(expense.clone()))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[ExpenseStatus],
        to: ExpenseStatus,
    ) -> Result<Option<Expense>, AppError> {
        let mut state = self.state.write().await;
        match state.expenses.get_mut(&id) {
            Some(expense) if from.contains(&expense.status) => {
                expense.status = to;
                expense.updated_at = Utc::now();
                Ok(Some(expense.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid, only_if: Option<&[ExpenseStatus]>) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let allowed = match (state.expenses.get(&id), only_if) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(expense), Some(statuses)) => statuses.contains(&expense.status),
        };
        if allowed {
            state.expenses.remove(&id);
        }
        Ok(allowed)
    }
}
