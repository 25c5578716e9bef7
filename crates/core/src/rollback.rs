//! Rollback engine - undoes the most recently applied migration
//!
//! Strictly last-in-first-out: one ledger row per invocation, undone with
//! the script stored at apply time. The files on disk are never touched, so
//! a rolled-back version becomes pending again.

use sqlx::postgres::PgConnection;

use crate::error::{MigrationError, MigrationResult};
use crate::ledger::MigrationRecord;
use crate::runner::MigrationRunner;

/// Extension trait adding rollback to the runner
pub trait MigrationRollback {
    /// Undo exactly the most recently applied migration and return its
    /// ledger record.
    async fn rollback_last(&self) -> MigrationResult<MigrationRecord>;
}

impl MigrationRollback for MigrationRunner {
    async fn rollback_last(&self) -> MigrationResult<MigrationRecord> {
        let mut conn = self.acquire().await?;
        self.ledger().ensure_schema(&mut conn).await?;

        self.lock_session(&mut conn).await?;
        let result = rollback_inner(self, &mut conn).await;
        self.unlock_session(&mut conn).await;
        result
    }
}

/// Stored script and ledger delete run in one transaction: a failure leaves
/// the row in place and the rollback simply did not happen.
async fn rollback_inner(
    runner: &MigrationRunner,
    conn: &mut PgConnection,
) -> MigrationResult<MigrationRecord> {
    use sqlx::Acquire;

    let record = runner.ledger().last_record(conn).await?;

    let mut tx = conn
        .begin()
        .await
        .map_err(|e| MigrationError::sql("could not open a transaction", e))?;

    sqlx::raw_sql(&record.rollback_script)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            MigrationError::sql(
                format!(
                    "rollback script for {:010}_{} failed",
                    record.version, record.name
                ),
                e,
            )
        })?;

    runner.ledger().delete_record(&mut tx, record.id).await?;

    tx.commit()
        .await
        .map_err(|e| MigrationError::sql("could not commit rollback", e))?;

    tracing::info!(
        version = record.version,
        name = %record.name,
        "rolled back migration"
    );
    Ok(record)
}
