use expensa_core::{models::User, AppError};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, display_name, created_at, updated_at";

/// Repository for user profiles
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh the profile for an identity issued by the auth provider.
    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "upsert", db.record_id = %id))]
    pub async fn upsert(
        &self,
        id: Uuid,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<User, AppError> {
        let query = format!(
            r#"
            INSERT INTO users (id, email, display_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
                SET email = EXCLUDED.email,
                    display_name = COALESCE(EXCLUDED.display_name, users.display_name),
                    updated_at = NOW()
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<Postgres, User>(&query)
            .bind(id)
            .bind(email)
            .bind(display_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                let err = AppError::from(e);
                if err.is_unique_violation() {
                    AppError::Conflict(format!("Email {} is already registered", email))
                } else {
                    err
                }
            })
    }

    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<Postgres, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "select"))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<Postgres, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}
