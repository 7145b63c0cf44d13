use expensa_core::{
    models::{Expense, ExpenseChanges, ExpenseFilter, ExpenseOrder, ExpenseStatus, NewExpense},
    AppError,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub(crate) const EXPENSE_COLUMNS: &str = "id, organization_id, created_by, image_url, merchant_name, amount, currency, category, date, description, items, status, confidence, raw_extraction, created_at, updated_at";

fn status_names(statuses: &[ExpenseStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn order_clause(order: ExpenseOrder) -> &'static str {
    match order {
        ExpenseOrder::NewestFirst => " ORDER BY date DESC, created_at DESC",
        ExpenseOrder::OldestSubmittedFirst => " ORDER BY created_at ASC, id ASC",
        ExpenseOrder::DateAscending => " ORDER BY date ASC, created_at ASC",
    }
}

/// Repository for expense records
#[derive(Clone)]
pub struct ExpenseRepository {
    pool: PgPool,
}

impl ExpenseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, new), fields(db.table = "expenses", db.operation = "insert", organization_id = %new.organization_id))]
    pub async fn insert(&self, new: NewExpense) -> Result<Expense, AppError> {
        let query = format!(
            r#"
            INSERT INTO expenses (
                organization_id, created_by, image_url, merchant_name, amount, currency,
                category, date, description, items, status, confidence, raw_extraction
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            EXPENSE_COLUMNS
        );
        let expense = sqlx::query_as::<Postgres, Expense>(&query)
            .bind(new.organization_id)
            .bind(new.created_by)
            .bind(&new.image_url)
            .bind(&new.merchant_name)
            .bind(new.amount)
            .bind(&new.currency)
            .bind(&new.category)
            .bind(new.date)
            .bind(&new.description)
            .bind(Json(&new.items))
            .bind(new.status)
            .bind(new.confidence)
            .bind(&new.raw_extraction)
            .fetch_one(&self.pool)
            .await?;
        Ok(expense)
    }

    #[tracing::instrument(skip(self), fields(db.table = "expenses", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<Expense>, AppError> {
        let query = format!("SELECT {} FROM expenses WHERE id = $1", EXPENSE_COLUMNS);
        let expense = sqlx::query_as::<Postgres, Expense>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(expense)
    }

    #[tracing::instrument(skip(self), fields(db.table = "expenses", db.operation = "select", organization_id = %filter.organization_id))]
    pub async fn list(
        &self,
        filter: &ExpenseFilter,
        order: ExpenseOrder,
    ) -> Result<Vec<Expense>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM expenses WHERE organization_id = ",
            EXPENSE_COLUMNS
        ));
        qb.push_bind(filter.organization_id);

        if let Some(statuses) = &filter.statuses {
            qb.push(" AND status::text = ANY(");
            qb.push_bind(status_names(statuses));
            qb.push(")");
        }
        if let Some(from) = filter.from {
            qb.push(" AND date >= ");
            qb.push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND date <= ");
            qb.push_bind(to);
        }
        if let Some(created_by) = filter.created_by {
            qb.push(" AND created_by = ");
            qb.push_bind(created_by);
        }
        qb.push(order_clause(order));

        let expenses = qb
            .build_query_as::<Expense>()
            .fetch_all(&self.pool)
            .await?;
        Ok(expenses)
    }

    #[tracing::instrument(skip(self, changes), fields(db.table = "expenses", db.operation = "update", db.record_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        changes: ExpenseChanges,
        only_if: Option<&[ExpenseStatus]>,
    ) -> Result<Option<Expense>, AppError> {
        let query = format!(
            r#"
            UPDATE expenses
            SET merchant_name = COALESCE($2, merchant_name),
                amount = COALESCE($3, amount),
                currency = COALESCE($4, currency),
                category = COALESCE($5, category),
                date = COALESCE($6, date),
                description = COALESCE($7, description),
                items = COALESCE($8, items),
                updated_at = NOW()
            WHERE id = $1 AND ($9::text[] IS NULL OR status::text = ANY($9))
            RETURNING {}
            "#,
            EXPENSE_COLUMNS
        );
        let expense = sqlx::query_as::<Postgres, Expense>(&query)
            .bind(id)
            .bind(changes.merchant_name)
            .bind(changes.amount)
            .bind(changes.currency)
            .bind(changes.category)
            .bind(changes.date)
            .bind(changes.description)
            .bind(changes.items.map(Json))
            .bind(only_if.map(status_names))
            .fetch_optional(&self.pool)
            .await?;
        Ok(expense)
    }

    /// Move the expense to `to` only if its current status is one of `from`.
    /// Returns `None` when the expense is missing or was in another status.
    #[tracing::instrument(skip(self), fields(db.table = "expenses", db.operation = "update", db.record_id = %id))]
    pub async fn transition_status(
        &self,
        id: Uuid,
        from: &[ExpenseStatus],
        to: ExpenseStatus,
    ) -> Result<Option<Expense>, AppError> {
        let query = format!(
            r#"
            UPDATE expenses SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status::text = ANY($2)
            RETURNING {}
            "#,
            EXPENSE_COLUMNS
        );
        let expense = sqlx::query_as::<Postgres, Expense>(&query)
            .bind(id)
            .bind(status_names(from))
            .bind(to)
            .fetch_optional(&self.pool)
            .await?;
        Ok(expense)
    }

    /// Delete the expense, optionally only while it is in one of `only_if`.
    #[tracing::instrument(skip(self), fields(db.table = "expenses", db.operation = "delete", db.record_id = %id))]
    pub async fn delete(&self, id: Uuid, only_if: Option<&[ExpenseStatus]>) -> Result<bool, AppError> {
        let result = match only_if {
            Some(statuses) => {
                sqlx::query("DELETE FROM expenses WHERE id = $1 AND status::text = ANY($2)")
                    .bind(id)
                    .bind(status_names(statuses))
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM expenses WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }
}
