//! Execution engine - applies pending migrations against the database
//!
//! Each pending migration runs inside its own transaction that also writes
//! the ledger row; a failure rolls back that migration only and aborts the
//! run, leaving earlier commits applied. The whole run holds one connection
//! and a session advisory lock so concurrent invocations serialize across
//! processes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::Acquire;

use crate::config::MigrationConfig;
use crate::diff;
use crate::error::{MigrationError, MigrationResult};
use crate::ledger::{Ledger, MigrationRecord};
use crate::repository::{self, MigrationFile};

/// Result of applying pending migrations
#[derive(Debug, Default)]
pub struct RunReport {
    /// Identities of the migrations applied in this run, in order
    pub applied: Vec<AppliedMigration>,
    /// Number of migrations that were already in the ledger
    pub skipped: usize,
}

#[derive(Debug)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
}

/// State of one migration in the status report
#[derive(Debug)]
pub enum MigrationState {
    Pending,
    Applied {
        applied_at: DateTime<Utc>,
        /// The up file's current checksum no longer matches the one stored
        /// at apply time. Reported, never enforced.
        drifted: bool,
    },
}

#[derive(Debug)]
pub struct StatusEntry {
    pub version: i64,
    pub name: String,
    pub state: MigrationState,
}

/// Status of every known migration, discovered or recorded
#[derive(Debug, Default)]
pub struct StatusReport {
    /// Migrations present on disk, ascending by version
    pub entries: Vec<StatusEntry>,
    /// Ledger rows whose files no longer exist on disk
    pub missing_files: Vec<MigrationRecord>,
}

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    config: MigrationConfig,
    pool: PgPool,
    ledger: Ledger,
}

impl MigrationRunner {
    /// Connect to the database named by the configuration.
    pub async fn connect(config: MigrationConfig) -> MigrationResult<Self> {
        let pool = PgPool::connect(&config.database_url)
            .await
            .map_err(|e| MigrationError::Connection(e.to_string()))?;
        let ledger = Ledger::new(&config.ledger_table);

        Ok(Self {
            config,
            pool,
            ledger,
        })
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Apply every pending migration, strictly in ascending version order.
    pub async fn run(&self) -> MigrationResult<RunReport> {
        let files = repository::scan(&self.config.migrations_dir)?;

        let mut conn = self.acquire().await?;
        self.ledger.ensure_schema(&mut conn).await?;

        self.lock_session(&mut conn).await?;
        let result = self.apply_pending(&mut conn, files).await;
        self.unlock_session(&mut conn).await;
        result
    }

    async fn apply_pending(
        &self,
        conn: &mut PgConnection,
        files: Vec<MigrationFile>,
    ) -> MigrationResult<RunReport> {
        let applied = self.ledger.applied_versions(conn).await?;
        let skipped = applied.len();
        let pending = diff::pending(files, &applied);

        let mut report = RunReport {
            applied: Vec::new(),
            skipped,
        };
        for migration in &pending {
            self.apply_one(conn, migration).await?;
            report.applied.push(AppliedMigration {
                version: migration.version,
                name: migration.name.clone(),
            });
        }
        Ok(report)
    }

    /// Apply a single migration: ledger row and up script in one transaction.
    async fn apply_one(&self, conn: &mut PgConnection, migration: &MigrationFile) -> MigrationResult<()> {
        let up_sql = read_script(&migration.up_path)?;
        let down_sql = read_script(&migration.down_path)?;
        let checksum = script_checksum(&up_sql);

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| MigrationError::sql("could not open a transaction", e))?;

        self.ledger
            .insert_record(
                &mut tx,
                &migration.name,
                migration.version,
                &checksum,
                &down_sql,
                Utc::now(),
            )
            .await?;

        // The script runs verbatim as one unit; multi-statement bodies go
        // over the simple query protocol.
        sqlx::raw_sql(&up_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                MigrationError::sql(
                    format!(
                        "up script {:010}_{} failed",
                        migration.version, migration.name
                    ),
                    e,
                )
            })?;

        tx.commit()
            .await
            .map_err(|e| MigrationError::sql("could not commit migration", e))?;

        tracing::info!(
            version = migration.version,
            name = %migration.name,
            "applied migration"
        );
        Ok(())
    }

    /// Report the state of every discovered migration and every ledger row.
    pub async fn status(&self) -> MigrationResult<StatusReport> {
        let files = repository::scan(&self.config.migrations_dir)?;

        let mut conn = self.acquire().await?;
        self.ledger.ensure_schema(&mut conn).await?;
        let records = self.ledger.all_records(&mut conn).await?;

        let mut by_version: HashMap<i64, MigrationRecord> =
            records.into_iter().map(|r| (r.version, r)).collect();

        let mut report = StatusReport::default();
        for file in files {
            let state = match by_version.remove(&file.version) {
                Some(record) => {
                    let current = read_script(&file.up_path).map(|sql| script_checksum(&sql))?;
                    let drifted = current != record.checksum;
                    if drifted {
                        tracing::warn!(
                            version = file.version,
                            name = %file.name,
                            "up script changed after it was applied"
                        );
                    }
                    MigrationState::Applied {
                        applied_at: record.applied_at,
                        drifted,
                    }
                }
                None => MigrationState::Pending,
            };
            report.entries.push(StatusEntry {
                version: file.version,
                name: file.name,
                state,
            });
        }

        let mut orphans: Vec<MigrationRecord> = by_version.into_values().collect();
        orphans.sort_by_key(|r| r.version);
        report.missing_files = orphans;

        Ok(report)
    }

    /// Delete the highest-version pair from disk, refusing if it is applied.
    pub async fn remove_latest(&self) -> MigrationResult<MigrationFile> {
        let files = repository::scan(&self.config.migrations_dir)?;
        let latest = files
            .into_iter()
            .max_by_key(|m| m.version)
            .ok_or_else(|| MigrationError::EmptyRepository {
                dir: self.config.migrations_dir.clone(),
            })?;

        let mut conn = self.acquire().await?;
        self.ledger.ensure_schema(&mut conn).await?;
        let applied = self.ledger.applied_versions(&mut conn).await?;
        if applied.contains(&latest.version) {
            return Err(MigrationError::StillApplied {
                version: latest.version,
            });
        }

        repository::delete_pair(&latest)?;
        Ok(latest)
    }

    pub(crate) async fn acquire(&self) -> MigrationResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| MigrationError::Connection(e.to_string()))
    }

    /// Take a session advisory lock keyed off the ledger table so concurrent
    /// apply/rollback invocations serialize across processes. The version
    /// unique constraint remains the backstop.
    pub(crate) async fn lock_session(&self, conn: &mut PgConnection) -> MigrationResult<()> {
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(advisory_lock_key(self.ledger.table()))
            .execute(conn)
            .await
            .map_err(|e| MigrationError::sql("could not acquire the migration lock", e))?;
        Ok(())
    }

    /// Best-effort unlock; the lock also dies with the session.
    pub(crate) async fn unlock_session(&self, conn: &mut PgConnection) {
        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(advisory_lock_key(self.ledger.table()))
            .execute(conn)
            .await
        {
            tracing::warn!(error = %e, "could not release the migration lock");
        }
    }
}

/// Read a script file, rejecting empty bodies.
fn read_script(path: &Path) -> MigrationResult<String> {
    let content = fs::read_to_string(path).map_err(|e| MigrationError::fs(path, e))?;
    if content.is_empty() {
        return Err(MigrationError::EmptyScript {
            path: path.to_path_buf(),
        });
    }
    Ok(content)
}

/// Lowercase-hex SHA-256 of the script's exact byte content.
pub fn script_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn advisory_lock_key(table: &str) -> i64 {
    let digest = Sha256::digest(table.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}
