use chrono::{DateTime, Utc};
use expensa_core::{
    models::{Organization, OrganizationMember, OrganizationSettings, OrganizationSummary, Role},
    AppError,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::transaction::with_transaction;

pub(crate) const ORGANIZATION_COLUMNS: &str =
    "id, name, slug, settings, invite_code, invite_code_expires_at, created_by, created_at, updated_at";

/// Fields for a new organization.
#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub name: String,
    pub slug: String,
    pub created_by: Uuid,
    pub invite_code: String,
    pub invite_code_expires_at: DateTime<Utc>,
}

fn map_slug_conflict(err: sqlx::Error, slug: &str) -> AppError {
    let err = AppError::from(err);
    if err.is_unique_violation() {
        AppError::Conflict(format!("Organization slug '{}' is already taken", slug))
    } else {
        err
    }
}

/// Repository for organizations
#[derive(Clone)]
pub struct OrganizationRepository {
    pool: PgPool,
}

impl OrganizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the organization and its first owner in one transaction.
    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "insert"))]
    pub async fn create_with_owner(
        &self,
        new: NewOrganization,
    ) -> Result<(Organization, OrganizationMember), AppError> {
        with_transaction(&self.pool, |tx| {
            Box::pin(async move {
                let query = format!(
                    r#"
                    INSERT INTO organizations (name, slug, settings, invite_code, invite_code_expires_at, created_by)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING {}
                    "#,
                    ORGANIZATION_COLUMNS
                );
                let organization = sqlx::query_as::<Postgres, Organization>(&query)
                    .bind(&new.name)
                    .bind(&new.slug)
                    .bind(Json(OrganizationSettings::default()))
                    .bind(&new.invite_code)
                    .bind(new.invite_code_expires_at)
                    .bind(new.created_by)
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(|e| map_slug_conflict(e, &new.slug))?;

                let owner = sqlx::query_as::<Postgres, OrganizationMember>(
                    r#"
                    INSERT INTO organization_members (organization_id, user_id, role)
                    VALUES ($1, $2, $3)
                    RETURNING organization_id, user_id, role, joined_at
                    "#,
                )
                .bind(organization.id)
                .bind(new.created_by)
                .bind(Role::Owner)
                .fetch_one(&mut **tx)
                .await?;

                Ok((organization, owner))
            })
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<Organization>, AppError> {
        let query = format!(
            "SELECT {} FROM organizations WHERE id = $1",
            ORGANIZATION_COLUMNS
        );
        let organization = sqlx::query_as::<Postgres, Organization>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(organization)
    }

    #[tracing::instrument(skip(self, code), fields(db.table = "organizations", db.operation = "select"))]
    pub async fn find_by_invite_code(&self, code: &str) -> Result<Option<Organization>, AppError> {
        let query = format!(
            "SELECT {} FROM organizations WHERE invite_code = $1",
            ORGANIZATION_COLUMNS
        );
        let organization = sqlx::query_as::<Postgres, Organization>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(organization)
    }

    /// Organizations the user belongs to, with the user's role in each.
    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "select"))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrganizationSummary>, AppError> {
        let organizations = sqlx::query_as::<Postgres, OrganizationSummary>(
            r#"
            SELECT o.id, o.name, o.slug, m.role, m.joined_at
            FROM organizations o
            JOIN organization_members m ON m.organization_id = o.id
            WHERE m.user_id = $1
            ORDER BY o.name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(organizations)
    }

    #[tracing::instrument(skip(self, settings), fields(db.table = "organizations", db.operation = "update", db.record_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        name: Option<String>,
        settings: Option<OrganizationSettings>,
    ) -> Result<Organization, AppError> {
        let query = format!(
            r#"
            UPDATE organizations
            SET name = COALESCE($2, name),
                settings = COALESCE($3, settings),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ORGANIZATION_COLUMNS
        );
        sqlx::query_as::<Postgres, Organization>(&query)
            .bind(id)
            .bind(name)
            .bind(settings.map(Json))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", id)))
    }

    #[tracing::instrument(skip(self, code), fields(db.table = "organizations", db.operation = "update", db.record_id = %id))]
    pub async fn set_invite_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Organization, AppError> {
        let query = format!(
            r#"
            UPDATE organizations
            SET invite_code = $2, invite_code_expires_at = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ORGANIZATION_COLUMNS
        );
        sqlx::query_as::<Postgres, Organization>(&query)
            .bind(id)
            .bind(code)
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", id)))
    }

    /// Delete the organization. Members and expenses go with it (`ON DELETE CASCADE`).
    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "delete", db.record_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
