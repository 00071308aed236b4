//! Data models for bear-sync.
//!
//! - Note: a row of the Bear notes database, as consumed by the sync engine
//! - Database timestamp conversion (Core Data epoch ↔ Unix time)

pub mod note;

pub use note::{
    DB_EPOCH_OFFSET_SECS, Note, clean_title, db_to_unix, system_time_to_unix, unix_to_system_time,
};
