//! Sync state markers.
//!
//! Two sentinel files in the export folder hold the sync state in their own
//! modification times: `.sync-time.log` (last check for external edits) and
//! `.export-time.log` (last export). Their content is informational only.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::sync::file::{mtime, write_with_mtime};
use crate::sync::types::SyncResult;

pub const SYNC_MARKER: &str = ".sync-time.log";
pub const EXPORT_MARKER: &str = ".export-time.log";

/// The marker pair inside one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMarkers {
    dir: PathBuf,
}

fn stamp(now: SystemTime) -> String {
    DateTime::<Local>::from(now)
        .format("%Y-%m-%d at %H:%M:%S")
        .to_string()
}

impl SyncMarkers {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    #[must_use]
    pub fn sync_path(&self) -> PathBuf {
        self.dir.join(SYNC_MARKER)
    }

    #[must_use]
    pub fn export_path(&self) -> PathBuf {
        self.dir.join(EXPORT_MARKER)
    }

    /// When external edits were last looked for.
    #[must_use]
    pub fn last_sync_check(&self) -> Option<SystemTime> {
        mtime(&self.sync_path())
    }

    /// When the notes were last exported.
    #[must_use]
    pub fn last_export(&self) -> Option<SystemTime> {
        mtime(&self.export_path())
    }

    /// Both markers are in place, so there is a baseline to compare against.
    #[must_use]
    pub fn has_baseline(&self) -> bool {
        self.last_sync_check().is_some() && self.last_export().is_some()
    }

    /// Advance the sync-check marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn touch_sync_check(&self, now: SystemTime) -> SyncResult<()> {
        write_with_mtime(
            &self.sync_path(),
            &format!("Checked for Markdown updates to sync at: {}", stamp(now)),
            now,
        )
    }

    /// Advance both markers together.
    ///
    /// # Errors
    ///
    /// Returns an error if either marker cannot be written.
    pub fn write_both(&self, now: SystemTime) -> SyncResult<()> {
        let content = format!("Markdown from Bear written at: {}", stamp(now));
        write_with_mtime(&self.export_path(), &content, now)?;
        write_with_mtime(&self.sync_path(), &content, now)
    }
}
