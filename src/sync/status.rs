//! Sync status display.
//!
//! Reports the marker times, whether the database changed since the last
//! export and which exported files were edited since the last pass. Nothing
//! is written; the sync-check marker is left where it is.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use colored::Colorize;
use serde::Serialize;

use crate::config::SyncConfig;
use crate::storage::{NoteStore, database_mtime};
use crate::sync::detect::peek_changed;
use crate::sync::driver::check_db_modified;
use crate::sync::state::SyncMarkers;
use crate::sync::types::SyncResult;

/// Current state of the export folder and the database.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub export_path: PathBuf,
    pub database_path: PathBuf,
    pub database_found: bool,
    /// Active notes in the database, if it could be read.
    pub active_notes: Option<usize>,
    pub database_modified_at: Option<DateTime<Local>>,
    pub last_sync_check: Option<DateTime<Local>>,
    pub last_export: Option<DateTime<Local>>,
    /// The next sync would export.
    pub db_modified: bool,
    /// Exported files edited since the last pass.
    pub pending_files: Vec<PathBuf>,
}

fn local(time: Option<SystemTime>) -> Option<DateTime<Local>> {
    time.map(DateTime::<Local>::from)
}

/// Get the current sync status.
///
/// # Errors
///
/// Returns an error if the export folder cannot be walked.
pub fn get_sync_status(config: &SyncConfig) -> SyncResult<SyncStatus> {
    let markers = SyncMarkers::new(&config.export_path);
    let database_found = config.database_path.is_file();

    // An unreadable database is reported, not fatal
    let active_notes = if database_found {
        NoteStore::open(&config.database_path)
            .and_then(|store| store.snapshot())
            .map(|snapshot| snapshot.notes.len())
            .ok()
    } else {
        None
    };

    let pending_files = peek_changed(&config.export_path)?
        .map(|changes| changes.files)
        .unwrap_or_default();

    Ok(SyncStatus {
        export_path: config.export_path.clone(),
        database_path: config.database_path.clone(),
        database_found,
        active_notes,
        database_modified_at: local(database_mtime(&config.database_path)),
        last_sync_check: local(markers.last_sync_check()),
        last_export: local(markers.last_export()),
        db_modified: database_found && check_db_modified(config),
        pending_files,
    })
}

fn stamp(time: Option<&DateTime<Local>>) -> String {
    time.map_or_else(
        || "never".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// Print sync status to stdout in a human-readable format.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();

    println!("{}", "Database:".blue().bold());
    println!("  Path:          {}", status.database_path.display());
    if status.database_found {
        match status.active_notes {
            Some(n) => println!("  Notes:         {n}"),
            None => println!("  Notes:         {}", "unreadable".red()),
        }
        println!("  Modified:      {}", stamp(status.database_modified_at.as_ref()));
    } else {
        println!("  {}", "Not found".red());
    }
    println!();

    println!("{}", "Export Folder:".blue().bold());
    println!("  Path:          {}", status.export_path.display());
    println!("  Last export:   {}", stamp(status.last_export.as_ref()));
    println!("  Last check:    {}", stamp(status.last_sync_check.as_ref()));
    println!();

    if status.pending_files.is_empty() {
        println!("{}", "No external edits pending.".green());
    } else {
        println!("{}", "Edited Files:".yellow().bold());
        for path in &status.pending_files {
            let shown = path.strip_prefix(&status.export_path).unwrap_or(path);
            println!("  {}", shown.display());
        }
        println!(
            "  {}: {}",
            "Total".bold(),
            status.pending_files.len()
        );
    }

    if status.db_modified {
        println!();
        println!("{}", "Bear notes changed since the last export.".yellow());
    }

    if status.db_modified || !status.pending_files.is_empty() {
        println!();
        println!("{}", "Run 'bearsync sync' to bring both sides up to date.".dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::file::write_with_mtime;
    use crate::test_utils::{FixtureNote, TestEnv};
    use std::time::Duration;

    #[test]
    fn test_status_before_first_export() {
        let env = TestEnv::with_notes(&[FixtureNote::new("a", "Alpha", "Alpha", 10.0)]);

        let status = get_sync_status(&env.config).unwrap();

        assert!(status.database_found);
        assert_eq!(status.active_notes, Some(1));
        assert!(status.last_export.is_none());
        assert!(status.db_modified);
        assert!(status.pending_files.is_empty());
    }

    #[test]
    fn test_status_lists_edits_without_moving_marker() {
        let env = TestEnv::new();
        let now = SystemTime::now();
        let secs = now.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs();
        let checked = SystemTime::UNIX_EPOCH + Duration::from_secs(secs - 60);
        let markers = SyncMarkers::new(&env.config.export_path);
        markers.write_both(checked).unwrap();
        let file = env.write_export("work/Plan.md", "Plan");
        write_with_mtime(&file, "Plan\nedited", now).unwrap();

        let status = get_sync_status(&env.config).unwrap();

        assert!(!status.database_found);
        assert!(!status.db_modified);
        assert_eq!(status.pending_files, vec![file]);
        assert_eq!(markers.last_sync_check(), Some(checked));
    }
}
