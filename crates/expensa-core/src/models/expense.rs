use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// Review status of an expense.
///
/// ```text
/// DRAFT ──approve──▶ VERIFIED
///   │                   ▲
///   └──flag──▶ FLAGGED ─┘ approve
/// DRAFT | FLAGGED ──reject──▶ (deleted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "expense_status", rename_all = "UPPERCASE")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpenseStatus {
    Draft,
    Verified,
    Flagged,
}

/// Reviewer action on a pending expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Flag,
    Reject,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Flag => "flag",
            ReviewAction::Reject => "reject",
        }
    }

    /// Statuses from which this action is allowed.
    pub fn allowed_from(&self) -> &'static [ExpenseStatus] {
        match self {
            ReviewAction::Approve => &[ExpenseStatus::Draft, ExpenseStatus::Flagged],
            ReviewAction::Flag => &[ExpenseStatus::Draft],
            ReviewAction::Reject => &[ExpenseStatus::Draft, ExpenseStatus::Flagged],
        }
    }
}

impl ExpenseStatus {
    pub const PENDING: [ExpenseStatus; 2] = [ExpenseStatus::Draft, ExpenseStatus::Flagged];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Draft => "DRAFT",
            ExpenseStatus::Verified => "VERIFIED",
            ExpenseStatus::Flagged => "FLAGGED",
        }
    }

    /// Pending expenses sit in the approval queue.
    pub fn is_pending(&self) -> bool {
        matches!(self, ExpenseStatus::Draft | ExpenseStatus::Flagged)
    }

    /// Apply a review action. `Ok(None)` means the expense is deleted.
    pub fn apply(self, action: ReviewAction) -> Result<Option<ExpenseStatus>, AppError> {
        if !action.allowed_from().contains(&self) {
            return Err(AppError::InvalidTransition {
                from: self.as_str().to_string(),
                action: action.as_str().to_string(),
            });
        }
        Ok(match action {
            ReviewAction::Approve => Some(ExpenseStatus::Verified),
            ReviewAction::Flag => Some(ExpenseStatus::Flagged),
            ReviewAction::Reject => None,
        })
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(ExpenseStatus::Draft),
            "VERIFIED" => Ok(ExpenseStatus::Verified),
            "FLAGGED" => Ok(ExpenseStatus::Flagged),
            other => Err(AppError::InvalidInput(format!(
                "Invalid status '{}': expected DRAFT, VERIFIED or FLAGGED",
                other
            ))),
        }
    }
}

/// One line item read from a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReceiptItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f64>)]
    pub quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f64>)]
    pub price: Option<Decimal>,
}

/// The central expense record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Expense {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub image_url: Option<String>,
    pub merchant_name: String,
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub items: Vec<ReceiptItem>,
    pub status: ExpenseStatus,
    pub confidence: Option<f64>,
    /// Model output as received, kept for auditability. Null for manual entries.
    #[schema(value_type = Option<Object>)]
    pub raw_extraction: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fully resolved values for a new expense row.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub image_url: Option<String>,
    pub merchant_name: String,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub items: Vec<ReceiptItem>,
    pub status: ExpenseStatus,
    pub confidence: Option<f64>,
    pub raw_extraction: Option<serde_json::Value>,
}

/// Field changes for an existing expense. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ExpenseChanges {
    pub merchant_name: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub items: Option<Vec<ReceiptItem>>,
}

/// Request DTO for manual entry (`POST /expenses`).
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateExpenseRequest {
    pub organization_id: Uuid,
    #[validate(length(
        min = 1,
        max = 255,
        message = "merchant_name must be between 1 and 255 characters"
    ))]
    pub merchant_name: String,
    #[schema(value_type = f64)]
    pub amount: Decimal,
    #[serde(default)]
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: Option<String>,
    /// Resolved from the merchant name when omitted.
    #[serde(default)]
    #[validate(length(min = 1, max = 60, message = "category must be between 1 and 60 characters"))]
    pub category: Option<String>,
    /// Defaults to today.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
    #[serde(default)]
    #[validate(length(max = 2048))]
    pub image_url: Option<String>,
}

/// Request DTO for `PATCH /expenses`; the id travels in the body.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct UpdateExpenseRequest {
    pub id: Uuid,
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 255,
        message = "merchant_name must be between 1 and 255 characters"
    ))]
    pub merchant_name: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 60, message = "category must be between 1 and 60 characters"))]
    pub category: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<ReceiptItem>>,
}

/// Optional reason attached to reject/flag. Logged, not persisted.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
pub struct ReviewRequest {
    #[serde(default)]
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Query over one organization's expenses.
#[derive(Debug, Clone)]
pub struct ExpenseFilter {
    pub organization_id: Uuid,
    /// `None` matches every status.
    pub statuses: Option<Vec<ExpenseStatus>>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpenseOrder {
    /// Most recent receipt date first (expense lists).
    #[default]
    NewestFirst,
    /// Oldest submission first (approval queue).
    OldestSubmittedFirst,
    /// Receipt date ascending (exports).
    DateAscending,
}

impl ExpenseOrder {
    pub fn sort(&self, expenses: &mut [Expense]) {
        match self {
            ExpenseOrder::NewestFirst => expenses.sort_by(|a, b| {
                b.date
                    .cmp(&a.date)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
            ExpenseOrder::OldestSubmittedFirst => {
                expenses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            }
            ExpenseOrder::DateAscending => expenses.sort_by(|a, b| {
                a.date
                    .cmp(&b.date)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            }),
        }
    }
}

impl ExpenseFilter {
    pub fn for_organization(organization_id: Uuid) -> Self {
        ExpenseFilter {
            organization_id,
            statuses: None,
            from: None,
            to: None,
            created_by: None,
        }
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        expense.organization_id == self.organization_id
            && self
                .statuses
                .as_ref()
                .is_none_or(|s| s.contains(&expense.status))
            && self.from.is_none_or(|from| expense.date >= from)
            && self.to.is_none_or(|to| expense.date <= to)
            && self.created_by.is_none_or(|id| expense.created_by == id)
    }
}

/// Exclusive upper bound of the `NUMERIC(14,2)` amount column.
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Amounts are stored non-negative with two decimal places and at most twelve integer digits.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, AppError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::InvalidInput(
            "amount must not be negative".to_string(),
        ));
    }
    let amount = amount.round_dp(2);
    if amount >= AMOUNT_LIMIT {
        return Err(AppError::InvalidInput(format!(
            "amount must be below {}",
            AMOUNT_LIMIT
        )));
    }
    Ok(amount)
}
