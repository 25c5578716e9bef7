//! Diff engine - which discovered migrations are not yet applied
//!
//! A migration is pending iff its version has no ledger row. Ordering is
//! re-established here by an explicit sort; the repository already sorts,
//! but correctness must not depend on where the input came from.

use std::collections::HashSet;

use crate::repository::MigrationFile;

/// Filter out applied versions and sort the remainder ascending by version.
pub fn pending(files: Vec<MigrationFile>, applied: &HashSet<i64>) -> Vec<MigrationFile> {
    let mut pending: Vec<MigrationFile> = files
        .into_iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();
    pending.sort_by_key(|m| m.version);
    pending
}
