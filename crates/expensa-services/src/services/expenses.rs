//! Expense record writer and CRUD.

use std::sync::Arc;

use chrono::NaiveDate;
use expensa_core::constants::DEFAULT_CURRENCY;
use expensa_core::models::{
    validate_amount, CreateExpenseRequest, Expense, ExpenseChanges, ExpenseFilter, ExpenseOrder,
    ExpenseStatus, NewExpense, UpdateExpenseRequest,
};
use expensa_core::policy::{Action, Resource};
use expensa_core::validation::{normalize_category_name, trimmed};
use expensa_core::{AppError, Clock};
use expensa_db::ExpenseStore;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use super::access::{AccessControl, Actor};
use super::categorization::CategoryCache;
use super::extraction::Extraction;
use super::receipt_files::ReceiptFiles;

/// Filters for listing one organization's expenses.
#[derive(Debug, Clone)]
pub struct ExpenseListQuery {
    pub organization_id: Uuid,
    pub statuses: Option<Vec<ExpenseStatus>>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Only the caller's own expenses.
    pub mine: bool,
}

pub(crate) fn expense_resource(expense: &Expense) -> Resource {
    Resource::Expense {
        organization_id: expense.organization_id,
        created_by: expense.created_by,
        status: expense.status,
    }
}

pub(crate) fn check_date_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(), AppError> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::InvalidInput(format!(
                "from ({}) must not be after to ({})",
                from, to
            )));
        }
    }
    Ok(())
}

fn normalize_currency(currency: Option<String>) -> Result<Option<String>, AppError> {
    match trimmed(currency) {
        None => Ok(None),
        Some(c) if c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()) => {
            Ok(Some(c.to_uppercase()))
        }
        Some(c) => Err(AppError::InvalidInput(format!(
            "Invalid currency '{}': expected a 3-letter code",
            c
        ))),
    }
}

fn required_merchant(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput(
            "merchant_name must not be blank".to_string(),
        ));
    }
    Ok(name.to_string())
}

pub struct ExpenseService {
    expenses: Arc<dyn ExpenseStore>,
    access: AccessControl,
    categories: Arc<CategoryCache>,
    clock: Arc<dyn Clock>,
    flag_threshold: Option<Decimal>,
    files: Arc<ReceiptFiles>,
}

impl ExpenseService {
    pub fn new(
        expenses: Arc<dyn ExpenseStore>,
        access: AccessControl,
        categories: Arc<CategoryCache>,
        clock: Arc<dyn Clock>,
        flag_threshold: Option<Decimal>,
        files: Arc<ReceiptFiles>,
    ) -> Self {
        Self {
            expenses,
            access,
            categories,
            clock,
            flag_threshold,
            files,
        }
    }

    /// New expenses start as DRAFT, or FLAGGED above the configured threshold.
    fn initial_status(&self, amount: Decimal) -> ExpenseStatus {
        match self.flag_threshold {
            Some(threshold) if amount > threshold => ExpenseStatus::Flagged,
            _ => ExpenseStatus::Draft,
        }
    }

    async fn write(&self, new: NewExpense) -> Result<Expense, AppError> {
        let expense = self.expenses.insert(new).await?;
        tracing::info!(
            expense_id = %expense.id,
            organization_id = %expense.organization_id,
            status = %expense.status,
            "Expense recorded"
        );
        Ok(expense)
    }

    /// Persist an extraction result for a caller already authorized to submit.
    pub(crate) async fn record_extraction(
        &self,
        actor: &Actor,
        organization_id: Uuid,
        image_url: Option<String>,
        extraction: &Extraction,
    ) -> Result<Expense, AppError> {
        let receipt = &extraction.receipt;
        let category = self.categories.resolve(&receipt.merchant_name).await?;
        let amount = validate_amount(receipt.amount.abs())?;

        self.write(NewExpense {
            organization_id,
            created_by: actor.user_id,
            image_url,
            merchant_name: receipt.merchant_name.clone(),
            amount,
            currency: receipt.currency.clone(),
            category,
            date: receipt.date,
            description: receipt.description.clone(),
            items: receipt.items.clone(),
            status: self.initial_status(amount),
            confidence: Some(receipt.confidence),
            raw_extraction: Some(extraction.raw.clone()),
        })
        .await
    }

    /// Manual entry.
    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id, organization_id = %request.organization_id))]
    pub async fn create(&self, actor: &Actor, request: CreateExpenseRequest) -> Result<Expense, AppError> {
        request.validate()?;
        let organization_id = request.organization_id;
        self.access
            .authorize(
                actor,
                organization_id,
                Action::CreateExpense,
                &Resource::Organization { id: organization_id },
            )
            .await?;

        let merchant_name = required_merchant(&request.merchant_name)?;
        let amount = validate_amount(request.amount)?;
        let currency =
            normalize_currency(request.currency)?.unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let category = match trimmed(request.category) {
            Some(name) => normalize_category_name(&name)?,
            None => self.categories.resolve(&merchant_name).await?,
        };

        self.write(NewExpense {
            organization_id,
            created_by: actor.user_id,
            image_url: trimmed(request.image_url),
            merchant_name,
            amount,
            currency,
            category,
            date: request.date.unwrap_or_else(|| self.clock.today()),
            description: trimmed(request.description),
            items: request.items,
            status: self.initial_status(amount),
            confidence: None,
            raw_extraction: None,
        })
        .await
    }

    async fn load(&self, id: Uuid) -> Result<Expense, AppError> {
        self.expenses
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Expense {} not found", id)))
    }

    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Expense, AppError> {
        let expense = self.load(id).await?;
        self.access
            .authorize(
                actor,
                expense.organization_id,
                Action::ViewExpense,
                &expense_resource(&expense),
            )
            .await?;
        Ok(expense)
    }

    /// Members only ever see their own expenses; other roles see everything unless `mine`.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn list(&self, actor: &Actor, query: ExpenseListQuery) -> Result<Vec<Expense>, AppError> {
        check_date_range(query.from, query.to)?;
        let org = Resource::Organization {
            id: query.organization_id,
        };
        let subject = self
            .access
            .authorize(actor, query.organization_id, Action::ViewOrganization, &org)
            .await?;

        let own_only = query.mine || !self.access.allows(&subject, Action::ListAllExpenses, &org);
        let filter = ExpenseFilter {
            organization_id: query.organization_id,
            statuses: query.statuses,
            from: query.from,
            to: query.to,
            created_by: own_only.then_some(actor.user_id),
        };
        self.expenses.list(&filter, ExpenseOrder::NewestFirst).await
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id, expense_id = %request.id))]
    pub async fn update(&self, actor: &Actor, request: UpdateExpenseRequest) -> Result<Expense, AppError> {
        request.validate()?;
        let expense = self.load(request.id).await?;
        let subject = self
            .access
            .authorize(
                actor,
                expense.organization_id,
                Action::EditExpense,
                &expense_resource(&expense),
            )
            .await?;

        let changes = ExpenseChanges {
            merchant_name: request
                .merchant_name
                .as_deref()
                .map(required_merchant)
                .transpose()?,
            amount: request.amount.map(validate_amount).transpose()?,
            currency: normalize_currency(request.currency)?,
            category: request
                .category
                .as_deref()
                .map(normalize_category_name)
                .transpose()?,
            date: request.date,
            description: request.description.map(|d| d.trim().to_string()),
            items: request.items,
        };

        // Members were authorized against the status read above; a review landing in
        // between must not let their edit through.
        let reviewer = subject.role.is_some_and(|r| r.is_reviewer());
        let only_if: Option<&[ExpenseStatus]> = if reviewer {
            None
        } else {
            Some(&ExpenseStatus::PENDING)
        };

        match self.expenses.update(expense.id, changes, only_if).await? {
            Some(updated) => Ok(updated),
            None => match self.expenses.get(expense.id).await? {
                None => Err(AppError::NotFound(format!("Expense {} not found", expense.id))),
                Some(current) => Err(AppError::InvalidTransition {
                    from: current.status.as_str().to_string(),
                    action: "edit".to_string(),
                }),
            },
        }
    }

    /// Submitters may delete their own pending expenses; reviewers may delete any.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), AppError> {
        let expense = self.load(id).await?;
        let subject = self
            .access
            .authorize(
                actor,
                expense.organization_id,
                Action::DeleteExpense,
                &expense_resource(&expense),
            )
            .await?;

        let reviewer = subject.role.is_some_and(|r| r.is_reviewer());
        let only_if: Option<&[ExpenseStatus]> = if reviewer {
            None
        } else {
            Some(&ExpenseStatus::PENDING)
        };

        if !self.expenses.delete(id, only_if).await? {
            return match self.expenses.get(id).await? {
                None => Err(AppError::NotFound(format!("Expense {} not found", id))),
                Some(current) => Err(AppError::Forbidden(format!(
                    "{} expenses can only be deleted by an owner, admin or accountant",
                    current.status
                ))),
            };
        }

        tracing::info!(expense_id = %id, "Expense deleted");
        self.files.release(&expense).await;
        Ok(())
    }
}
