//! Change detection in the export folder.
//!
//! A file counts as changed when its mtime is newer than the sync-check
//! marker. The marker is advanced before the walk, so a file written while
//! the pass runs is picked up by the next pass instead of being lost.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

use crate::sync::state::SyncMarkers;
use crate::sync::types::SyncResult;

/// Extensions of files that may hold notes.
pub const NOTE_EXTENSIONS: [&str; 3] = ["md", "txt", "markdown"];

/// Externally modified files and the baseline they were measured against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub files: Vec<PathBuf>,
    pub last_sync_check: SystemTime,
    /// When the files were last generated; newer database edits conflict.
    pub last_export: SystemTime,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_note_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| NOTE_EXTENSIONS.iter().any(|n| n.eq_ignore_ascii_case(ext)))
}

/// Note files under `root` modified after `since`, sorted by path.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked.
pub fn changed_since(root: &Path, since: SystemTime) -> SyncResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_note_file(entry.path()) {
            continue;
        }
        if entry.metadata()?.modified()? > since {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn baseline(markers: &SyncMarkers) -> Option<(SystemTime, SystemTime)> {
    Some((markers.last_sync_check()?, markers.last_export()?))
}

/// Find externally changed files and advance the sync-check marker to `now`.
///
/// Returns `None` when the markers are missing: there is nothing to compare
/// against before the first export.
///
/// # Errors
///
/// Returns an error if the marker cannot be written or the tree walked.
pub fn detect_changed(root: &Path, now: SystemTime) -> SyncResult<Option<ChangeSet>> {
    let markers = SyncMarkers::new(root);
    let Some((last_sync_check, last_export)) = baseline(&markers) else {
        debug!(root = %root.display(), "No sync markers yet");
        return Ok(None);
    };

    markers.touch_sync_check(now)?;
    let files = changed_since(root, last_sync_check)?;
    debug!(changed = files.len(), "Scanned for external changes");

    Ok(Some(ChangeSet {
        files,
        last_sync_check,
        last_export,
    }))
}

/// Like [`detect_changed`] but leaves the marker alone.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked.
pub fn peek_changed(root: &Path) -> SyncResult<Option<ChangeSet>> {
    let markers = SyncMarkers::new(root);
    let Some((last_sync_check, last_export)) = baseline(&markers) else {
        return Ok(None);
    };

    Ok(Some(ChangeSet {
        files: changed_since(root, last_sync_check)?,
        last_sync_check,
        last_export,
    }))
}
