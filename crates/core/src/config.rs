//! Configuration for the migration engine
//!
//! One immutable value built by the caller and handed to each component by
//! plain clone; nothing mutates it after construction.

use std::path::{Path, PathBuf};

/// Default folder scanned for migration files
pub const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";

/// Default name of the ledger table tracking applied migrations
pub const DEFAULT_LEDGER_TABLE: &str = "rg_migrations";

/// Configuration for the migration engine
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Connection string for the target database
    pub database_url: String,
    /// Name of the ledger table
    pub ledger_table: String,
}

impl MigrationConfig {
    pub fn new(migrations_dir: impl AsRef<Path>, database_url: impl Into<String>) -> Self {
        Self {
            migrations_dir: migrations_dir.as_ref().to_path_buf(),
            database_url: database_url.into(),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }

    /// Override the ledger table name.
    pub fn with_ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self
    }
}
