use expensa_core::{models::Category, AppError};
use sqlx::{PgPool, Postgres};

/// Repository for the global category taxonomy
#[derive(Clone)]
pub struct CategoryRepository {
    pool: PgPool,
}

impl CategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All categories in their stored listing order.
    #[tracing::instrument(skip(self), fields(db.table = "categories", db.operation = "select"))]
    pub async fn list(&self) -> Result<Vec<Category>, AppError> {
        let categories = sqlx::query_as::<Postgres, Category>(
            "SELECT id, name, keywords, sort_order, created_at FROM categories ORDER BY sort_order ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }
}
