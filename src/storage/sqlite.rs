//! SQLite snapshot reader.
//!
//! Opens the notes database read-only (shared cache) and yields note
//! records. Rows that cannot be decoded are reported back instead of
//! failing the whole snapshot.

use crate::error::{Error, Result};
use crate::model::{Note, db_to_unix, unix_to_system_time};
use crate::storage::schema::{
    SELECT_ACTIVE_NOTE_BY_ID, SELECT_ACTIVE_NOTES, SELECT_DUPLICATE_TITLES,
};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// How long to wait for Bear to release a write lock.
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Read-only handle on the notes database.
#[derive(Debug)]
pub struct NoteStore {
    conn: Connection,
}

/// All non-trashed notes at one point in time.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Notes that decoded cleanly.
    pub notes: Vec<Note>,
    /// Identifiers (or row positions) of rows that could not be read.
    pub unreadable: Vec<String>,
}

/// A title shared by more than one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateTitle {
    pub title: String,
    pub count: usize,
}

/// Raw row shape; `body` is optional because Bear leaves `ZTEXT` NULL
/// for notes that are still being created or are encrypted.
struct NoteRow {
    id: Option<String>,
    title: Option<String>,
    body: Option<String>,
    created_at: Option<f64>,
    modified_at: Option<f64>,
    trashed: Option<i64>,
}

impl NoteRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            body: row.get(2)?,
            created_at: row.get(3)?,
            modified_at: row.get(4)?,
            trashed: row.get(5)?,
        })
    }

    /// Returns the note, or the identifier of an unusable row.
    fn into_note(self) -> std::result::Result<Note, String> {
        let id = self.id.ok_or_else(|| "<missing id>".to_string())?;
        let Some(body) = self.body else {
            return Err(id);
        };
        let modified_at = self.modified_at.unwrap_or_default();
        if unix_to_system_time(db_to_unix(modified_at)).is_none() {
            return Err(id);
        }

        Ok(Note {
            id,
            title: self.title.unwrap_or_default(),
            body,
            created_at: self.created_at.unwrap_or_default(),
            modified_at,
            trashed: self.trashed.unwrap_or(0) != 0,
        })
    }
}

impl NoteStore {
    /// Open the notes database read-only.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseNotFound` if the file is missing, or a database
    /// error if it cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::DatabaseNotFound {
                path: path.to_path_buf(),
            });
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_SHARED_CACHE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;

        // Bear may be mid-write; wait rather than fail immediately
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;

        Ok(Self { conn })
    }

    /// Read every non-trashed note.
    ///
    /// # Errors
    ///
    /// Returns an error if the query itself fails. Individual rows that
    /// cannot be decoded are listed in `Snapshot::unreadable`.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let mut stmt = self.conn.prepare(SELECT_ACTIVE_NOTES)?;
        let rows = stmt.query_map([], NoteRow::from_row)?;

        let mut snapshot = Snapshot::default();
        for (index, row) in rows.enumerate() {
            match row {
                Ok(raw) => match raw.into_note() {
                    Ok(note) => snapshot.notes.push(note),
                    Err(id) => {
                        warn!(note_id = %id, "Skipping note with unreadable body");
                        snapshot.unreadable.push(id);
                    }
                },
                Err(e) => {
                    warn!(row = index, error = %e, "Skipping undecodable note row");
                    snapshot.unreadable.push(format!("<row {index}>"));
                }
            }
        }

        debug!(
            notes = snapshot.notes.len(),
            unreadable = snapshot.unreadable.len(),
            "Read database snapshot"
        );
        Ok(snapshot)
    }

    /// Get a non-trashed note by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_active_note(&self, id: &str) -> Result<Option<Note>> {
        self.query_note(SELECT_ACTIVE_NOTE_BY_ID, id)
    }

    fn query_note(&self, sql: &str, id: &str) -> Result<Option<Note>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt.query_row([id], NoteRow::from_row).optional()?;

        Ok(raw.and_then(|r| match r.into_note() {
            Ok(note) => Some(note),
            Err(id) => {
                warn!(note_id = %id, "Note has no readable body");
                None
            }
        }))
    }

    /// Titles used by more than one note, most duplicated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn duplicate_titles(&self) -> Result<Vec<DuplicateTitle>> {
        let mut stmt = self.conn.prepare(SELECT_DUPLICATE_TITLES)?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok(DuplicateTitle {
                title: row.get(0)?,
                count: usize::try_from(count).unwrap_or(0),
            })
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }
}

/// Latest mtime of `<db>` and `<db>-wal`, whichever exist.
///
/// Bear writes through a write-ahead log, so the main file's mtime can lag
/// behind the actual last change.
#[must_use]
pub fn database_mtime(path: &Path) -> Option<SystemTime> {
    let mut wal = path.as_os_str().to_owned();
    wal.push("-wal");

    [path.to_path_buf(), PathBuf::from(wal)]
        .iter()
        .filter_map(|p| fs::metadata(p).and_then(|m| m.modified()).ok())
        .max()
}

/// Total surplus copies across duplicate titles (count - 1 per title).
#[must_use]
pub fn duplicate_surplus(duplicates: &[DuplicateTitle]) -> usize {
    duplicates.iter().map(|d| d.count.saturating_sub(1)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FixtureNote, create_fixture_db};
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let result = NoteStore::open(&temp_dir.path().join("nope.sqlite"));
        assert!(matches!(result, Err(Error::DatabaseNotFound { .. })));
    }

    #[test]
    fn test_snapshot_skips_trashed_and_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let db = create_fixture_db(
            temp_dir.path(),
            &[
                FixtureNote::new("a", "Alpha", "Alpha body", 10.0),
                FixtureNote::new("b", "Beta", "Beta body", 20.0).trashed(),
                FixtureNote::new("c", "Gamma", "", 30.0).without_body(),
            ],
        );

        let store = NoteStore::open(&db).unwrap();
        let snapshot = store.snapshot().unwrap();

        assert_eq!(snapshot.notes.len(), 1);
        assert_eq!(snapshot.notes[0].id, "a");
        assert_eq!(snapshot.unreadable, vec!["c".to_string()]);
    }

    #[test]
    fn test_get_active_note_ignores_trash() {
        let temp_dir = TempDir::new().unwrap();
        let db = create_fixture_db(
            temp_dir.path(),
            &[FixtureNote::new("b", "Beta", "Beta body", 20.0).trashed()],
        );

        let store = NoteStore::open(&db).unwrap();
        assert!(store.get_active_note("b").unwrap().is_none());
    }

    #[test]
    fn test_out_of_range_timestamp_is_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let db = create_fixture_db(
            temp_dir.path(),
            &[
                FixtureNote::new("a", "Alpha", "Alpha body", 10.0),
                FixtureNote::new("far", "Far", "Far body", 1e300),
            ],
        );

        let store = NoteStore::open(&db).unwrap();
        let snapshot = store.snapshot().unwrap();

        assert_eq!(snapshot.notes.len(), 1);
        assert_eq!(snapshot.unreadable, vec!["far".to_string()]);
        assert!(store.get_active_note("far").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_titles() {
        let temp_dir = TempDir::new().unwrap();
        let db = create_fixture_db(
            temp_dir.path(),
            &[
                FixtureNote::new("d1", "Draft", "Draft\none", 10.0),
                FixtureNote::new("d2", "Draft", "Draft\ntwo", 11.0),
                FixtureNote::new("x", "Other", "Other", 12.0),
            ],
        );

        let store = NoteStore::open(&db).unwrap();
        let dups = store.duplicate_titles().unwrap();
        assert_eq!(
            dups,
            vec![DuplicateTitle {
                title: "Draft".into(),
                count: 2
            }]
        );
        assert_eq!(duplicate_surplus(&dups), 1);
    }

    #[test]
    fn test_database_mtime_present() {
        let temp_dir = TempDir::new().unwrap();
        let db = create_fixture_db(temp_dir.path(), &[]);
        assert!(database_mtime(&db).is_some());
        assert!(database_mtime(&temp_dir.path().join("nope.sqlite")).is_none());
    }
}
