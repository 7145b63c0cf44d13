//! Database transaction utilities for multi-step writes that must be atomic.

use expensa_core::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;
use std::pin::Pin;

/// Execute a closure within a database transaction
///
/// Commits when the closure returns `Ok`, rolls back otherwise.
///
/// ```ignore
/// with_transaction(pool, |tx| Box::pin(async move {
///     sqlx::query("INSERT INTO ...").execute(&mut **tx).await?;
///     sqlx::query("UPDATE ...").execute(&mut **tx).await?;
///     Ok(())
/// })).await
/// ```
pub async fn with_transaction<F, R>(pool: &PgPool, f: F) -> Result<R, AppError>
where
    F: for<'c> FnOnce(
        &'c mut Transaction<'_, Postgres>,
    ) -> Pin<Box<dyn Future<Output = Result<R, AppError>> + Send + 'c>>,
{
    let mut tx = pool.begin().await?;

    match f(&mut tx).await {
        Ok(result) => {
            tx.commit().await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Transaction rollback failed");
            }
            Err(e)
        }
    }
}
