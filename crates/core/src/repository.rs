//! Migration repository - file system operations for migrations
//!
//! Discovers migration file pairs on disk, parses identity (version, name)
//! out of filenames, and creates or deletes pairs. Filenames follow
//! `<10-digit unix-seconds version>_<name>.<up|down>.sql`; anything ending
//! in `.sql` that does not match the grammar is an error, not skipped.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{MigrationError, MigrationResult};

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";
const VERSION_WIDTH: usize = 10;

/// Direction of a migration script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// One discovered migration: identity plus the paths of both scripts.
///
/// Only the up file's presence is guaranteed at scan time; the down file is
/// validated lazily when the migration is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: i64,
    pub name: String,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
}

impl MigrationFile {
    fn from_identity(dir: &Path, version: i64, name: &str) -> Self {
        Self {
            version,
            name: name.to_string(),
            up_path: dir.join(format!("{version:010}_{name}{UP_SUFFIX}")),
            down_path: dir.join(format!("{version:010}_{name}{DOWN_SUFFIX}")),
        }
    }
}

/// Create the migrations folder if it does not exist yet.
pub fn ensure_folder(dir: &Path) -> MigrationResult<()> {
    fs::create_dir_all(dir).map_err(|e| MigrationError::fs(dir, e))
}

/// Scan a folder for migration files, one entry per up/down pair.
///
/// Result is sorted ascending by version; the directory's enumeration order
/// is never trusted. Non-`.sql` entries are ignored.
pub fn scan(dir: &Path) -> MigrationResult<Vec<MigrationFile>> {
    let entries = fs::read_dir(dir).map_err(|e| MigrationError::fs(dir, e))?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::fs(dir, e))?;
        let path = entry.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "sql") {
            continue;
        }

        let filename = entry.file_name();
        let filename = filename.to_string_lossy();
        let (version, name, direction) = parse_filename(&filename)?;
        // Down files carry the same identity; grammar-check them, emit once.
        if direction == Direction::Up {
            migrations.push(MigrationFile::from_identity(dir, version, &name));
        }
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// Fail if any migration in the folder already carries `candidate` as its
/// parsed name. Comparison is exact equality, never substring matching.
pub fn check_duplicate(dir: &Path, candidate: &str) -> MigrationResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| MigrationError::fs(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::fs(dir, e))?;
        let path = entry.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "sql") {
            continue;
        }

        let filename = entry.file_name();
        let filename = filename.to_string_lossy();
        let (_, name, _) = parse_filename(&filename)?;
        if name == candidate {
            return Err(MigrationError::DuplicateName {
                name: candidate.to_string(),
            });
        }
    }
    Ok(())
}

/// Create an empty up/down pair named `name`, stamped with the current unix
/// time as its version. All-or-nothing: if either file cannot be created,
/// the sibling that was is removed before the error is returned.
pub fn create(dir: &Path, name: &str) -> MigrationResult<(PathBuf, PathBuf)> {
    validate_name(name)?;
    check_duplicate(dir, name)?;

    let version = Utc::now().timestamp();
    let pair = MigrationFile::from_identity(dir, version, name);

    if let Err(e) = fs::write(&pair.up_path, "") {
        return Err(MigrationError::fs(&pair.up_path, e));
    }
    if let Err(e) = fs::write(&pair.down_path, "") {
        if let Err(cleanup) = fs::remove_file(&pair.up_path) {
            tracing::warn!(
                path = %pair.up_path.display(),
                error = %cleanup,
                "could not clean up orphaned up script after failed pair creation"
            );
        }
        return Err(MigrationError::fs(&pair.down_path, e));
    }

    Ok((pair.up_path, pair.down_path))
}

/// Delete both files of a pair from disk. The ledger is never touched here;
/// callers decide whether the pair is eligible for removal.
pub fn delete_pair(migration: &MigrationFile) -> MigrationResult<()> {
    fs::remove_file(&migration.up_path).map_err(|e| MigrationError::fs(&migration.up_path, e))?;
    fs::remove_file(&migration.down_path).map_err(|e| MigrationError::fs(&migration.down_path, e))?;
    Ok(())
}

/// Parse a migration filename into (version, name, direction).
///
/// The grammar is strict: exactly ten ASCII digits, one underscore, a
/// non-empty name, and a known direction suffix. No positional slicing.
fn parse_filename(filename: &str) -> MigrationResult<(i64, String, Direction)> {
    let malformed = |reason| MigrationError::MalformedFilename {
        filename: filename.to_string(),
        reason,
    };

    let (stem, direction) = if let Some(stem) = filename.strip_suffix(UP_SUFFIX) {
        (stem, Direction::Up)
    } else if let Some(stem) = filename.strip_suffix(DOWN_SUFFIX) {
        (stem, Direction::Down)
    } else {
        return Err(malformed("expected a .up.sql or .down.sql suffix"));
    };

    let (version_str, name) = stem
        .split_once('_')
        .ok_or_else(|| malformed("expected <version>_<name>"))?;

    if version_str.len() != VERSION_WIDTH || !version_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("version must be exactly 10 digits"));
    }
    if name.is_empty() {
        return Err(malformed("name must not be empty"));
    }

    // Ten digits always fit in an i64.
    let version: i64 = version_str
        .parse()
        .map_err(|_| malformed("version must be exactly 10 digits"))?;

    Ok((version, name.to_string(), direction))
}

fn validate_name(name: &str) -> MigrationResult<()> {
    let invalid = |reason| MigrationError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > 64 {
        return Err(invalid("name must be at most 64 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid(
            "name may only contain letters, digits, underscores, and hyphens",
        ));
    }
    Ok(())
}
