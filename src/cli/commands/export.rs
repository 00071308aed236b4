//! Export command implementation: export and publish without reconciling.

use crate::config::load_config;
use crate::error::Result;
use crate::storage::NoteStore;
use crate::sync::{RecordingSink, SyncDriver};
use std::path::PathBuf;

/// Execute the export command.
///
/// External edits are not imported first. If files were edited since the
/// last sync the export is refused, unless `force` is set, in which case
/// they are backed up and then overwritten.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the database cannot be
/// opened, edits are pending without `force`, or export and publish fail.
pub fn execute(config_path: Option<&PathBuf>, force: bool, json: bool) -> Result<()> {
    let config = load_config(config_path.map(PathBuf::as_path))?;
    let store = NoteStore::open(&config.database_path)?;
    // No commands are sent during an export
    let mut sink = RecordingSink::new();
    let report = SyncDriver::new(&config, &mut sink).export_only(&store, force)?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!(
        "{} notes exported to {}",
        report.stats.files_written,
        config.export_path.display()
    );
    if !report.backed_up.is_empty() {
        println!(
            "  Unsynced edits backed up to {}: {}",
            config.backup_path.display(),
            report.backed_up.len()
        );
    }
    if report.stats.skipped > 0 {
        println!("  Skipped by tag filters: {}", report.stats.skipped);
    }
    if report.stats.missing_images > 0 {
        println!("  Missing images: {}", report.stats.missing_images);
    }
    for dest in report.published.iter().skip(1) {
        println!("  Also published to {}", dest.path.display());
    }
    Ok(())
}
