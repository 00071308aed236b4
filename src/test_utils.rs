//! Shared fixtures for unit tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use rusqlite::{Connection, params};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::config::SyncConfig;
use crate::model::Note;
use crate::storage::NoteStore;
use crate::storage::schema::NOTES_TABLE_SQL;
use crate::sync::file::set_mtime;

/// A row to insert into a fixture database.
#[derive(Debug, Clone)]
pub struct FixtureNote {
    id: String,
    title: String,
    body: Option<String>,
    modified_at: f64,
    trashed: bool,
}

impl FixtureNote {
    pub fn new(id: &str, title: &str, body: &str, modified_at: f64) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            body: Some(body.to_string()),
            modified_at,
            trashed: false,
        }
    }

    pub fn trashed(mut self) -> Self {
        self.trashed = true;
        self
    }

    /// Leave `ZTEXT` NULL, as Bear does for notes it has not finished writing.
    pub fn without_body(mut self) -> Self {
        self.body = None;
        self
    }
}

/// Create `database.sqlite` in `dir` holding the given notes.
pub fn create_fixture_db(dir: &Path, notes: &[FixtureNote]) -> PathBuf {
    let path = dir.join("database.sqlite");
    write_fixture_db(&path, notes);
    path
}

fn write_fixture_db(path: &Path, notes: &[FixtureNote]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(NOTES_TABLE_SQL).unwrap();
    for note in notes {
        conn.execute(
            "INSERT INTO ZSFNOTE (ZUNIQUEIDENTIFIER, ZTITLE, ZTEXT, ZCREATIONDATE, ZMODIFICATIONDATE, ZTRASHED)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
            params![
                note.id,
                note.title,
                note.body,
                note.modified_at,
                i64::from(note.trashed)
            ],
        )
        .unwrap();
    }
}

/// An in-memory note; created and modified at the same database time.
pub fn note(id: &str, title: &str, body: &str, modified_at: f64) -> Note {
    Note {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        created_at: modified_at,
        modified_at,
        trashed: false,
    }
}

/// A temporary home directory with a config rooted in it.
pub struct TestEnv {
    temp_dir: TempDir,
    pub config: SyncConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let mut config = SyncConfig::for_home(root);
        config.database_path = root.join("database.sqlite");
        config.image_source_path = root.join("images");
        config.download_settle_secs = 0;
        config.reconcile_settle_secs = 0;
        config.command_delay_ms = 0;

        Self { temp_dir, config }
    }

    /// Like [`TestEnv::new`] with a notes database at `config.database_path`.
    pub fn with_notes(notes: &[FixtureNote]) -> Self {
        let env = Self::new();
        write_fixture_db(&env.config.database_path, notes);
        env
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store(&self) -> NoteStore {
        NoteStore::open(&self.config.database_path).unwrap()
    }

    /// Push the database mtime into the past.
    pub fn age_database(&self, by: Duration) {
        set_mtime(&self.config.database_path, SystemTime::now() - by).unwrap();
    }

    /// Write a file relative to the export folder.
    pub fn write_export(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.config.export_path.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a file relative to the image source folder.
    pub fn write_image(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.config.image_source_path.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    /// Every file under `root` as (relative path, content, mtime), sorted.
    pub fn snapshot_tree(&self, root: &Path) -> Vec<(PathBuf, String, SystemTime)> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .map(Result::unwrap)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
                let content = String::from_utf8_lossy(&fs::read(e.path()).unwrap()).into_owned();
                let mtime = e.metadata().unwrap().modified().unwrap();
                (rel, content, mtime)
            })
            .collect()
    }
}
