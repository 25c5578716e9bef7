//! Ledger - the persisted record of applied migrations
//!
//! One table, append-mostly: the execution engine inserts a row per applied
//! migration, the rollback engine deletes the newest one. Ordering by `id`
//! equals chronological application order. All operations take an explicit
//! connection so inserts and deletes compose into the engines' transactions.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::Row;

use crate::error::{MigrationError, MigrationResult};

/// SQLSTATE for a unique-constraint violation
const UNIQUE_VIOLATION: &str = "23505";

/// One ledger row: an applied migration and everything needed to undo it.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub id: i32,
    pub name: String,
    pub version: i64,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub rollback_script: String,
}

/// Access to the ledger table
#[derive(Debug, Clone)]
pub struct Ledger {
    table: String,
}

impl Ledger {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the ledger table if it does not exist. Idempotent.
    pub async fn ensure_schema(&self, conn: &mut PgConnection) -> MigrationResult<()> {
        sqlx::query(&self.create_table_sql())
            .execute(conn)
            .await
            .map_err(|e| MigrationError::SchemaCreation(e.to_string()))?;
        Ok(())
    }

    /// Versions of every applied migration, for diffing only.
    pub async fn applied_versions(&self, conn: &mut PgConnection) -> MigrationResult<HashSet<i64>> {
        let sql = format!("SELECT version FROM {}", self.table);
        let rows = sqlx::query(&sql)
            .fetch_all(conn)
            .await
            .map_err(|e| MigrationError::sql("could not list applied versions", e))?;

        let mut versions = HashSet::with_capacity(rows.len());
        for row in rows {
            let version: i64 = row
                .try_get("version")
                .map_err(|e| MigrationError::sql("could not read version column", e))?;
            versions.insert(version);
        }
        Ok(versions)
    }

    /// Insert the row for a freshly applied migration and return its id.
    ///
    /// A duplicate version is the double-apply race; the unique constraint
    /// turns it into `DuplicateVersion` here.
    pub async fn insert_record(
        &self,
        conn: &mut PgConnection,
        name: &str,
        version: i64,
        checksum: &str,
        rollback_script: &str,
        applied_at: DateTime<Utc>,
    ) -> MigrationResult<i32> {
        let sql = format!(
            "INSERT INTO {} (name, version, checksum, rollback_script, applied_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(version)
            .bind(checksum)
            .bind(rollback_script)
            .bind(applied_at)
            .fetch_one(conn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MigrationError::DuplicateVersion { version }
                } else {
                    MigrationError::sql(format!("could not record migration {version}"), e)
                }
            })?;

        row.try_get("id")
            .map_err(|e| MigrationError::sql("could not read inserted id", e))
    }

    /// The most recently applied migration, by insertion order.
    pub async fn last_record(&self, conn: &mut PgConnection) -> MigrationResult<MigrationRecord> {
        let sql = format!(
            "SELECT id, name, version, checksum, applied_at, rollback_script \
             FROM {} ORDER BY id DESC LIMIT 1",
            self.table
        );
        let row = sqlx::query(&sql)
            .fetch_optional(conn)
            .await
            .map_err(|e| MigrationError::sql("could not fetch the last applied migration", e))?
            .ok_or(MigrationError::NothingToRollback)?;

        record_from_row(&row)
    }

    /// Every ledger row, ascending by application order. Used for status.
    pub async fn all_records(&self, conn: &mut PgConnection) -> MigrationResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT id, name, version, checksum, applied_at, rollback_script \
             FROM {} ORDER BY id ASC",
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(conn)
            .await
            .map_err(|e| MigrationError::sql("could not list applied migrations", e))?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn delete_record(&self, conn: &mut PgConnection, id: i32) -> MigrationResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        sqlx::query(&sql)
            .bind(id)
            .execute(conn)
            .await
            .map_err(|e| MigrationError::sql(format!("could not delete ledger row {id}"), e))?;
        Ok(())
    }

    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id              serial          primary key,\n    \
                name            varchar(64)     not null,\n    \
                version         bigint          unique not null,\n    \
                checksum        varchar(256)    not null,\n    \
                applied_at      timestamptz     not null,\n    \
                rollback_script text            not null\n\
            )",
            self.table
        )
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> MigrationResult<MigrationRecord> {
    let read = |e| MigrationError::sql("could not read ledger row", e);
    Ok(MigrationRecord {
        id: row.try_get("id").map_err(read)?,
        name: row.try_get("name").map_err(read)?,
        version: row.try_get("version").map_err(read)?,
        checksum: row.try_get("checksum").map_err(read)?,
        applied_at: row.try_get("applied_at").map_err(read)?,
        rollback_script: row.try_get("rollback_script").map_err(read)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == UNIQUE_VIOLATION)
}
