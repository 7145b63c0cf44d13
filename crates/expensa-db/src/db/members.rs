use expensa_core::{
    models::{MemberWithUser, OrganizationMember, Role},
    AppError,
};
use sqlx::{PgConnection, PgPool, Postgres};
use uuid::Uuid;

use super::transaction::with_transaction;

/// Repository for organization memberships. Role changes and removals that would leave an
/// organization without an owner are rejected inside the same transaction that applies them.
#[derive(Clone)]
pub struct MemberRepository {
    pool: PgPool,
}

/// Every owner row of the organization, locked in a fixed order so that concurrent
/// demotions or removals queue behind each other instead of deadlocking.
const LOCK_OWNERS: &str = "SELECT user_id FROM organization_members WHERE organization_id = $1 AND role = 'owner' ORDER BY user_id FOR UPDATE";

const LOCK_MEMBER: &str =
    "SELECT role FROM organization_members WHERE organization_id = $1 AND user_id = $2 FOR UPDATE";

/// Lock the owner rows, then the target membership, and refuse if `user_id` is the only owner.
async fn ensure_not_last_owner(
    conn: &mut PgConnection,
    organization_id: Uuid,
    user_id: Uuid,
) -> Result<Role, AppError> {
    let owners = sqlx::query_scalar::<Postgres, Uuid>(LOCK_OWNERS)
        .bind(organization_id)
        .fetch_all(&mut *conn)
        .await?;

    let current = sqlx::query_scalar::<Postgres, Role>(LOCK_MEMBER)
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} is not a member", user_id)))?;

    if current == Role::Owner && owners.len() <= 1 {
        return Err(AppError::LastOwner(
            "An organization must keep at least one owner".to_string(),
        ));
    }

    Ok(current)
}

impl MemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "organization_members", db.operation = "select"))]
    pub async fn get_role(&self, organization_id: Uuid, user_id: Uuid) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_scalar::<Postgres, Role>(
            "SELECT role FROM organization_members WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    #[tracing::instrument(skip(self), fields(db.table = "organization_members", db.operation = "select"))]
    pub async fn list(&self, organization_id: Uuid) -> Result<Vec<MemberWithUser>, AppError> {
        let members = sqlx::query_as::<Postgres, MemberWithUser>(
            r#"
            SELECT m.user_id, u.email, u.display_name, m.role, m.joined_at
            FROM organization_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.organization_id = $1
            ORDER BY m.joined_at ASC
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    #[tracing::instrument(skip(self), fields(db.table = "organization_members", db.operation = "insert"))]
    pub async fn add(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, AppError> {
        sqlx::query_as::<Postgres, OrganizationMember>(
            r#"
            INSERT INTO organization_members (organization_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (organization_id, user_id) DO NOTHING
            RETURNING organization_id, user_id, role, joined_at
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::Conflict("User is already a member of this organization".to_string())
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "organization_members", db.operation = "update"))]
    pub async fn update_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<OrganizationMember, AppError> {
        with_transaction(&self.pool, |tx| {
            Box::pin(async move {
                if role != Role::Owner {
                    ensure_not_last_owner(&mut **tx, organization_id, user_id).await?;
                }

                sqlx::query_as::<Postgres, OrganizationMember>(
                    r#"
                    UPDATE organization_members SET role = $3
                    WHERE organization_id = $1 AND user_id = $2
                    RETURNING organization_id, user_id, role, joined_at
                    "#,
                )
                .bind(organization_id)
                .bind(user_id)
                .bind(role)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} is not a member", user_id)))
            })
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(db.table = "organization_members", db.operation = "delete"))]
    pub async fn remove(&self, organization_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        with_transaction(&self.pool, |tx| {
            Box::pin(async move {
                ensure_not_last_owner(&mut **tx, organization_id, user_id).await?;

                sqlx::query(
                    "DELETE FROM organization_members WHERE organization_id = $1 AND user_id = $2",
                )
                .bind(organization_id)
                .bind(user_id)
                .execute(&mut **tx)
                .await?;
                Ok(())
            })
        })
        .await
    }
}
