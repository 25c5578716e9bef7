//! Error types for the migration engine
//!
//! Every failure the engine can surface is a variant here; the CLI maps the
//! rendered message to a non-zero exit status in one place.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a migration named '{name}' already exists")]
    DuplicateName { name: String },

    #[error("malformed migration filename '{filename}': {reason}")]
    MalformedFilename { filename: String, reason: &'static str },

    #[error("invalid migration name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("migration script {} is empty", path.display())]
    EmptyScript { path: PathBuf },

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("could not create the migration ledger table: {0}")]
    SchemaCreation(String),

    #[error("version {version} is already recorded in the ledger")]
    DuplicateVersion { version: i64 },

    #[error("{context}: {source}")]
    Sql {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("nothing to roll back: the ledger is empty")]
    NothingToRollback,

    #[error("no migrations found in {}", dir.display())]
    EmptyRepository { dir: PathBuf },

    #[error("migration {version} is recorded as applied; roll it back before removing its files")]
    StillApplied { version: i64 },
}

impl MigrationError {
    /// Wrap an I/O error with the path it occurred on.
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Wrap a sqlx error with the statement context it occurred in.
    ///
    /// A unique-constraint violation on the ledger's version column is the
    /// double-apply guard and gets its own variant.
    pub(crate) fn sql(context: impl Into<String>, source: sqlx::Error) -> Self {
        MigrationError::Sql {
            context: context.into(),
            source,
        }
    }
}
