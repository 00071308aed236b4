//! Error types for bear-sync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 6=sync, 7=config, 9=safety, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for `--json` consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bear-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseNotFound,
    DatabaseError,

    // Sync (exit 6)
    SyncError,
    PendingEdits,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Safety guard (exit 9)
    UnsafePath,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseNotFound => "DATABASE_NOT_FOUND",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::SyncError => "SYNC_ERROR",
            Self::PendingEdits => "PENDING_EDITS",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::UnsafePath => "UNSAFE_PATH",
        }
    }

    /// Category-based exit code (2-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::DatabaseNotFound | Self::DatabaseError => 2,
            Self::SyncError | Self::PendingEdits => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::UnsafePath => 9,
        }
    }

    /// Whether rerunning the same command later may succeed.
    ///
    /// Database and sync failures are usually transient: the notes app
    /// may hold a lock or a sync client may still be writing files.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError | Self::SyncError | Self::IoError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in bear-sync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Notes database not found at {path}")]
    DatabaseNotFound { path: PathBuf },

    #[error("Refusing to delete {path}: path does not contain `{marker}`")]
    UnsafePath { path: PathBuf, marker: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("{count} exported files were edited since the last sync")]
    PendingEdits { count: usize },
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::DatabaseNotFound { .. } => ErrorCode::DatabaseNotFound,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::UnsafePath { .. } => ErrorCode::UnsafePath,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Sync(_) => ErrorCode::SyncError,
            Self::PendingEdits { .. } => ErrorCode::PendingEdits,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::DatabaseNotFound { path } => Some(format!(
                "Check that Bear is installed, or set `database_path` in the config file \
                 (looked for {}).",
                path.display()
            )),

            Self::UnsafePath { marker, .. } => Some(format!(
                "The staging folder is wiped before every export. Point `staging_path` at a \
                 folder whose path contains `{marker}`."
            )),

            Self::PendingEdits { .. } => Some(
                "Run `bearsync sync` to import them first, or `bearsync export --force` to back \
                 them up and overwrite."
                    .to_string(),
            ),

            Self::Config(_) => Some(
                "Run `bearsync status` to see the resolved configuration paths.".to_string(),
            ),

            Self::Database(_) => {
                Some("Bear may be writing to its database; try again in a moment.".to_string())
            }

            Self::Io(_) | Self::Json(_) | Self::Sync(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
