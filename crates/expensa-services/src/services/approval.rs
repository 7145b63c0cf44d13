//! Approval workflow.
//!
//! Transitions are applied with a single conditional update, so two reviewers acting on
//! the same expense cannot both succeed: the loser sees `INVALID_TRANSITION` (the expense
//! moved on) or `NOT_FOUND` (it was rejected).

use std::sync::Arc;

use expensa_core::models::{Expense, ExpenseOrder, ExpenseFilter, ExpenseStatus, ReviewAction};
use expensa_core::policy::{Action, Resource};
use expensa_core::AppError;
use expensa_db::ExpenseStore;
use uuid::Uuid;

use super::access::{AccessControl, Actor};
use super::expenses::expense_resource;
use super::receipt_files::ReceiptFiles;

fn policy_action(action: ReviewAction) -> Action {
    match action {
        ReviewAction::Approve => Action::ApproveExpense,
        ReviewAction::Flag => Action::FlagExpense,
        ReviewAction::Reject => Action::RejectExpense,
    }
}

pub struct ApprovalService {
    expenses: Arc<dyn ExpenseStore>,
    access: AccessControl,
    files: Arc<ReceiptFiles>,
}

impl ApprovalService {
    pub fn new(
        expenses: Arc<dyn ExpenseStore>,
        access: AccessControl,
        files: Arc<ReceiptFiles>,
    ) -> Self {
        Self {
            expenses,
            access,
            files,
        }
    }

    /// Load the expense, authorize the reviewer and check the transition is legal from the
    /// status we read.
    async fn prepare(
        &self,
        actor: &Actor,
        id: Uuid,
        action: ReviewAction,
    ) -> Result<(Expense, Option<ExpenseStatus>), AppError> {
        let expense = self
            .expenses
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Expense {} not found", id)))?;
        self.access
            .authorize(
                actor,
                expense.organization_id,
                policy_action(action),
                &expense_resource(&expense),
            )
            .await?;
        let target = expense.status.apply(action)?;
        Ok((expense, target))
    }

    /// Explain why a conditional update matched nothing.
    async fn lost_race(&self, id: Uuid, action: ReviewAction) -> AppError {
        match self.expenses.get(id).await {
            Ok(Some(current)) => AppError::InvalidTransition {
                from: current.status.as_str().to_string(),
                action: action.as_str().to_string(),
            },
            Ok(None) => AppError::NotFound(format!("Expense {} not found", id)),
            Err(err) => err,
        }
    }

    async fn transition(
        &self,
        actor: &Actor,
        id: Uuid,
        action: ReviewAction,
    ) -> Result<Expense, AppError> {
        let (expense, target) = self.prepare(actor, id, action).await?;
        let Some(target) = target else {
            return Err(AppError::Internal(format!(
                "{} does not produce a status",
                action.as_str()
            )));
        };

        match self
            .expenses
            .transition_status(expense.id, action.allowed_from(), target)
            .await?
        {
            Some(updated) => {
                tracing::info!(
                    expense_id = %id,
                    reviewer = %actor.user_id,
                    from = %expense.status,
                    to = %updated.status,
                    "Expense status changed"
                );
                Ok(updated)
            }
            None => Err(self.lost_race(id, action).await),
        }
    }

    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn approve(&self, actor: &Actor, id: Uuid) -> Result<Expense, AppError> {
        self.transition(actor, id, ReviewAction::Approve).await
    }

    #[tracing::instrument(skip(self, reason), fields(user_id = %actor.user_id))]
    pub async fn flag(&self, actor: &Actor, id: Uuid, reason: Option<&str>) -> Result<Expense, AppError> {
        let expense = self.transition(actor, id, ReviewAction::Flag).await?;
        if let Some(reason) = reason {
            tracing::info!(expense_id = %id, reason = %reason, "Expense flagged");
        }
        Ok(expense)
    }

    /// Rejection deletes the expense and its stored receipt. The reason is only logged.
    #[tracing::instrument(skip(self, reason), fields(user_id = %actor.user_id))]
    pub async fn reject(&self, actor: &Actor, id: Uuid, reason: Option<&str>) -> Result<(), AppError> {
        let (expense, _) = self.prepare(actor, id, ReviewAction::Reject).await?;

        if !self
            .expenses
            .delete(expense.id, Some(ReviewAction::Reject.allowed_from()))
            .await?
        {
            return Err(self.lost_race(id, ReviewAction::Reject).await);
        }

        tracing::info!(
            expense_id = %id,
            reviewer = %actor.user_id,
            reason = reason.unwrap_or(""),
            "Expense rejected"
        );
        self.files.release(&expense).await;
        Ok(())
    }

    /// Pending (DRAFT or FLAGGED) expenses of the organization, oldest submission first.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn queue(&self, actor: &Actor, organization_id: Uuid) -> Result<Vec<Expense>, AppError> {
        self.access
            .authorize(
                actor,
                organization_id,
                Action::ViewApprovalQueue,
                &Resource::Organization { id: organization_id },
            )
            .await?;

        let filter = ExpenseFilter {
            statuses: Some(ExpenseStatus::PENDING.to_vec()),
            ..ExpenseFilter::for_organization(organization_id)
        };
        self.expenses
            .list(&filter, ExpenseOrder::OldestSubmittedFirst)
            .await
    }
}
