//! Sync result types and errors.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Statistics for one export run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    /// Notes read from the database snapshot.
    pub notes: usize,
    /// Files (or bundles) written to staging; multi-folder copies count separately.
    pub files_written: usize,
    /// Notes left out by tag filters.
    pub skipped: usize,
    /// Notes whose body could not be read.
    pub unreadable: usize,
    /// Images copied into bundles.
    pub images_copied: usize,
    /// Image references whose source file was missing.
    pub missing_images: usize,
}

impl ExportStats {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.files_written == 0
    }
}

/// What reconciling one external file did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No identifier (or an unknown one): created as a new note.
    ImportedAsNew,
    /// Replaced the text of the note it was exported from.
    AttachedToExisting,
    /// The database note changed too; a separate conflict note was created.
    ConflictFlagged,
    /// New images were added; the file was opened as a package.
    PackageImported,
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImportedAsNew => write!(f, "imported"),
            Self::AttachedToExisting => write!(f, "updated"),
            Self::ConflictFlagged => write!(f, "conflict"),
            Self::PackageImported => write!(f, "package"),
        }
    }
}

/// Result of reconciling a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReconciliation {
    pub path: PathBuf,
    pub outcome: ReconcileOutcome,
    /// Whether the command sink accepted the command.
    pub acknowledged: bool,
}

/// Counts across a reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub imported: usize,
    pub updated: usize,
    pub conflicts: usize,
    pub packages: usize,
    /// Files that could not be read, backed up or converted; skipped.
    pub errors: usize,
    /// The files counted in `errors`.
    pub skipped: Vec<PathBuf>,
    /// Files whose command was not acknowledged; retried next run.
    pub failed: Vec<PathBuf>,
}

impl ReconcileStats {
    pub fn record(&mut self, result: &FileReconciliation) {
        if !result.acknowledged {
            self.failed.push(result.path.clone());
            return;
        }
        match result.outcome {
            ReconcileOutcome::ImportedAsNew => self.imported += 1,
            ReconcileOutcome::AttachedToExisting => self.updated += 1,
            ReconcileOutcome::ConflictFlagged => self.conflicts += 1,
            ReconcileOutcome::PackageImported => self.packages += 1,
        }
    }

    /// Count a file that errored before any command was sent.
    pub fn record_error(&mut self, path: &Path) {
        self.errors += 1;
        self.skipped.push(path.to_path_buf());
    }

    /// Fold another pass into this one.
    pub fn merge(&mut self, other: Self) {
        self.imported += other.imported;
        self.updated += other.updated;
        self.conflicts += other.conflicts;
        self.packages += other.packages;
        self.errors += other.errors;
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    /// Successfully reconciled files.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.imported + self.updated + self.conflicts + self.packages
    }
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// A destructive operation was refused.
    #[error("Refusing to delete {path}: path does not contain `{marker}`")]
    UnsafePath { path: PathBuf, marker: String },

    /// Directory traversal failed.
    #[error("Walk error: {0}")]
    Walk(String),

    /// Exported files were edited and not yet imported.
    #[error("{count} exported files were edited since the last sync")]
    PendingEdits { count: usize },
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<walkdir::Error> for SyncError {
    fn from(err: walkdir::Error) -> Self {
        Self::Walk(err.to_string())
    }
}

impl From<crate::error::Error> for SyncError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::Io(e) => Self::Io(e),
            crate::error::Error::Json(e) => Self::Json(e),
            crate::error::Error::UnsafePath { path, marker } => Self::UnsafePath { path, marker },
            crate::error::Error::PendingEdits { count } => Self::PendingEdits { count },
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<SyncError> for crate::error::Error {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Io(e) => Self::Io(e),
            SyncError::Json(e) => Self::Json(e),
            SyncError::UnsafePath { path, marker } => Self::UnsafePath { path, marker },
            SyncError::PendingEdits { count } => Self::PendingEdits { count },
            SyncError::Database(msg) | SyncError::Walk(msg) => Self::Sync(msg),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
