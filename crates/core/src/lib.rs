//! # rollgate-core: versioned SQL migrations for PostgreSQL
//!
//! Tracks which timestamp-versioned SQL change-scripts have been applied to
//! a database, applies the pending ones in order (each in its own
//! transaction alongside its ledger row), and rolls back the most recent
//! one from the undo script stored at apply time.
//!
//! The pieces: [`repository`] discovers migration pairs on disk, [`ledger`]
//! is the applied-migrations table, [`diff`] computes the pending set,
//! [`runner`] applies it, and [`rollback`] undoes the newest entry.

pub mod config;
pub mod diff;
pub mod error;
pub mod ledger;
pub mod repository;
pub mod rollback;
pub mod runner;

// Re-export core types
pub use config::*;
pub use error::*;
pub use ledger::*;
pub use repository::*;
pub use rollback::*;
pub use runner::*;
