//! SQLite storage layer for bear-sync.
//!
//! The notes database belongs to Bear. This layer only ever opens it
//! read-only and never keeps a transaction open across file-system work.
//!
//! # Submodules
//!
//! - [`schema`] - Table and column names of the notes database
//! - [`sqlite`] - Read-only snapshot reader

pub mod schema;
pub mod sqlite;

pub use sqlite::{DuplicateTitle, NoteStore, Snapshot, database_mtime, duplicate_surplus};
