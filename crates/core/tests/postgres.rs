//! Database-backed round trips for the apply and rollback engines.
//!
//! These tests need a live PostgreSQL instance and skip themselves unless
//! `TEST_DATABASE_URL` or `DATABASE_URL` is set. Each test uses its own
//! ledger table and target objects so they can run in parallel.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rollgate_core::{
    diff, repository, MigrationConfig, MigrationError, MigrationRollback, MigrationRunner,
};
use sqlx::Row;
use tempfile::TempDir;

fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

fn write_pair(dir: &Path, version: i64, name: &str, up: &str, down: &str) {
    fs::write(dir.join(format!("{version:010}_{name}.up.sql")), up).unwrap();
    fs::write(dir.join(format!("{version:010}_{name}.down.sql")), down).unwrap();
}

/// Connect a runner whose ledger table is unique to the test, dropping
/// leftovers from previous runs.
async fn runner_for(suffix: &str, dir: &Path, url: &str) -> MigrationRunner {
    let ledger_table = format!("rollgate_test_ledger_{suffix}");
    let config =
        MigrationConfig::new(dir, url.to_string()).with_ledger_table(ledger_table.clone());
    let runner = MigrationRunner::connect(config).await.unwrap();

    sqlx::query(&format!("DROP TABLE IF EXISTS {ledger_table}"))
        .execute(runner.pool())
        .await
        .unwrap();
    runner
}

async fn drop_table(runner: &MigrationRunner, table: &str) {
    sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
        .execute(runner.pool())
        .await
        .unwrap();
}

async fn table_exists(runner: &MigrationRunner, table: &str) -> bool {
    sqlx::query("SELECT EXISTS (SELECT 1 FROM pg_tables WHERE tablename = $1)")
        .bind(table)
        .fetch_one(runner.pool())
        .await
        .unwrap()
        .get::<bool, _>(0)
}

async fn ledger_versions(runner: &MigrationRunner) -> Vec<i64> {
    let sql = format!(
        "SELECT version FROM {} ORDER BY id ASC",
        runner.config().ledger_table
    );
    sqlx::query(&sql)
        .fetch_all(runner.pool())
        .await
        .unwrap()
        .iter()
        .map(|row| row.get::<i64, _>("version"))
        .collect()
}

#[tokio::test]
async fn round_trip_apply_rollback_reapply() {
    let Some(url) = database_url() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL");
        return;
    };
    let tmp = TempDir::new().unwrap();
    write_pair(
        tmp.path(),
        1700000100,
        "add_users",
        "CREATE TABLE rollgate_rt_users (id int);",
        "DROP TABLE rollgate_rt_users;",
    );

    let runner = runner_for("round_trip", tmp.path(), &url).await;
    drop_table(&runner, "rollgate_rt_users").await;

    let report = runner.run().await.unwrap();
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].version, 1700000100);
    assert!(table_exists(&runner, "rollgate_rt_users").await);
    assert_eq!(ledger_versions(&runner).await, [1700000100]);

    // A second update with no new files is a no-op.
    let report = runner.run().await.unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped, 1);

    let record = runner.rollback_last().await.unwrap();
    assert_eq!(record.version, 1700000100);
    assert_eq!(record.rollback_script, "DROP TABLE rollgate_rt_users;");
    assert!(!table_exists(&runner, "rollgate_rt_users").await);
    assert!(ledger_versions(&runner).await.is_empty());

    // The files still exist, so the version is pending again.
    let report = runner.run().await.unwrap();
    assert_eq!(report.applied.len(), 1);
    assert!(table_exists(&runner, "rollgate_rt_users").await);

    runner.rollback_last().await.unwrap();
}

#[tokio::test]
async fn applies_ascending_and_rolls_back_lifo() {
    let Some(url) = database_url() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL");
        return;
    };
    let tmp = TempDir::new().unwrap();
    // Written out of order on purpose; the engine must sort by version.
    write_pair(
        tmp.path(),
        1700000200,
        "add_posts",
        "CREATE TABLE rollgate_lifo_posts (id int);",
        "DROP TABLE rollgate_lifo_posts;",
    );
    write_pair(
        tmp.path(),
        1700000100,
        "add_users",
        "CREATE TABLE rollgate_lifo_users (id int);",
        "DROP TABLE rollgate_lifo_users;",
    );

    let runner = runner_for("lifo", tmp.path(), &url).await;
    drop_table(&runner, "rollgate_lifo_posts").await;
    drop_table(&runner, "rollgate_lifo_users").await;

    let report = runner.run().await.unwrap();
    let applied: Vec<i64> = report.applied.iter().map(|m| m.version).collect();
    assert_eq!(applied, [1700000100, 1700000200]);
    assert_eq!(ledger_versions(&runner).await, [1700000100, 1700000200]);

    // One rollback undoes only the newest migration.
    let record = runner.rollback_last().await.unwrap();
    assert_eq!(record.version, 1700000200);
    assert!(!table_exists(&runner, "rollgate_lifo_posts").await);
    assert!(table_exists(&runner, "rollgate_lifo_users").await);
    assert_eq!(ledger_versions(&runner).await, [1700000100]);

    let record = runner.rollback_last().await.unwrap();
    assert_eq!(record.version, 1700000100);
    assert!(ledger_versions(&runner).await.is_empty());

    let err = runner.rollback_last().await.unwrap_err();
    assert!(matches!(err, MigrationError::NothingToRollback));
}

#[tokio::test]
async fn empty_script_aborts_without_a_ledger_row() {
    let Some(url) = database_url() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL");
        return;
    };
    let tmp = TempDir::new().unwrap();
    write_pair(
        tmp.path(),
        1700000100,
        "add_users",
        "CREATE TABLE rollgate_empty_users (id int);",
        "DROP TABLE rollgate_empty_users;",
    );
    // Empty down script: the migration must not be applied at all.
    write_pair(
        tmp.path(),
        1700000200,
        "broken",
        "CREATE TABLE rollgate_empty_broken (id int);",
        "",
    );

    let runner = runner_for("empty_script", tmp.path(), &url).await;
    drop_table(&runner, "rollgate_empty_users").await;
    drop_table(&runner, "rollgate_empty_broken").await;

    let err = runner.run().await.unwrap_err();
    assert!(matches!(err, MigrationError::EmptyScript { .. }));

    // The earlier migration in the run stays committed; the broken one
    // wrote nothing.
    assert_eq!(ledger_versions(&runner).await, [1700000100]);
    assert!(table_exists(&runner, "rollgate_empty_users").await);
    assert!(!table_exists(&runner, "rollgate_empty_broken").await);

    runner.rollback_last().await.unwrap();
}

#[tokio::test]
async fn failing_up_script_rolls_back_its_own_transaction() {
    let Some(url) = database_url() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL");
        return;
    };
    let tmp = TempDir::new().unwrap();
    write_pair(
        tmp.path(),
        1700000100,
        "bad_sql",
        "CREATE TABLE rollgate_fail_users (id int); THIS IS NOT SQL;",
        "DROP TABLE rollgate_fail_users;",
    );

    let runner = runner_for("failing_up", tmp.path(), &url).await;
    drop_table(&runner, "rollgate_fail_users").await;

    let err = runner.run().await.unwrap_err();
    assert!(matches!(err, MigrationError::Sql { .. }));

    // Neither the ledger row nor the partial schema change survives.
    assert!(ledger_versions(&runner).await.is_empty());
    assert!(!table_exists(&runner, "rollgate_fail_users").await);
}

#[tokio::test]
async fn duplicate_version_insert_is_rejected_by_the_ledger() {
    let Some(url) = database_url() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL");
        return;
    };
    let tmp = TempDir::new().unwrap();
    let runner = runner_for("dup_version", tmp.path(), &url).await;

    let ledger = rollgate_core::Ledger::new(runner.config().ledger_table.clone());
    let mut conn = runner.pool().acquire().await.unwrap();
    ledger.ensure_schema(&mut conn).await.unwrap();

    let now = chrono::Utc::now();
    ledger
        .insert_record(&mut conn, "add_users", 1700000100, "abc", "DROP TABLE x;", now)
        .await
        .unwrap();
    let err = ledger
        .insert_record(&mut conn, "add_users_again", 1700000100, "def", "DROP TABLE y;", now)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::DuplicateVersion { version: 1700000100 }
    ));
}

#[tokio::test]
async fn remove_refuses_applied_migrations() {
    let Some(url) = database_url() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL");
        return;
    };
    let tmp = TempDir::new().unwrap();
    write_pair(
        tmp.path(),
        1700000100,
        "add_users",
        "CREATE TABLE rollgate_rm_users (id int);",
        "DROP TABLE rollgate_rm_users;",
    );

    let runner = runner_for("remove_applied", tmp.path(), &url).await;
    drop_table(&runner, "rollgate_rm_users").await;

    runner.run().await.unwrap();
    let err = runner.remove_latest().await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::StillApplied { version: 1700000100 }
    ));
    // Nothing was deleted.
    assert_eq!(repository::scan(tmp.path()).unwrap().len(), 1);

    // Once rolled back, the pair can be removed.
    runner.rollback_last().await.unwrap();
    let removed = runner.remove_latest().await.unwrap();
    assert_eq!(removed.version, 1700000100);
    assert!(repository::scan(tmp.path()).unwrap().is_empty());

    let err = runner.remove_latest().await.unwrap_err();
    assert!(matches!(err, MigrationError::EmptyRepository { .. }));
}

#[tokio::test]
async fn status_reports_pending_applied_and_drift() {
    let Some(url) = database_url() else {
        eprintln!("skipping: no TEST_DATABASE_URL/DATABASE_URL");
        return;
    };
    let tmp = TempDir::new().unwrap();
    write_pair(
        tmp.path(),
        1700000100,
        "add_users",
        "CREATE TABLE rollgate_st_users (id int);",
        "DROP TABLE rollgate_st_users;",
    );
    write_pair(
        tmp.path(),
        1700000200,
        "add_posts",
        "CREATE TABLE rollgate_st_posts (id int);",
        "DROP TABLE rollgate_st_posts;",
    );

    let runner = runner_for("status", tmp.path(), &url).await;
    drop_table(&runner, "rollgate_st_users").await;
    drop_table(&runner, "rollgate_st_posts").await;

    // Apply only the first migration.
    let applied = HashSet::from([1700000200]);
    let files = repository::scan(tmp.path()).unwrap();
    assert_eq!(diff::pending(files, &applied).len(), 1);

    runner.run().await.unwrap();
    // Edit an applied up script afterwards: status flags drift.
    fs::write(
        tmp.path().join("1700000100_add_users.up.sql"),
        "CREATE TABLE rollgate_st_users (id bigint);",
    )
    .unwrap();

    let report = runner.status().await.unwrap();
    assert_eq!(report.entries.len(), 2);
    assert!(matches!(
        report.entries[0].state,
        rollgate_core::MigrationState::Applied { drifted: true, .. }
    ));
    assert!(matches!(
        report.entries[1].state,
        rollgate_core::MigrationState::Applied { drifted: false, .. }
    ));
    assert!(report.missing_files.is_empty());

    runner.rollback_last().await.unwrap();
    runner.rollback_last().await.unwrap();
}
