//! The full sync pass.
//!
//! ```text
//! CHECK_EXTERNAL ──changes──▶ settle ▶ RECONCILE ▶ settle ─┐
//!      ▲                                                   │
//!      └───────────────── (at most max_reconcile_rounds) ──┘
//!      │ no changes
//!      ▼
//! CHECK_DB_MODIFIED ──yes──▶ CLEAN_STAGING ▶ EXPORT ▶ WRITE_MARKERS ▶ PUBLISH ▶ MIRROR_IMAGES
//! ```
//!
//! Remote sync clients may still be delivering files while a pass runs, so
//! the export folder is checked again after every reconciliation round.
//! If changes keep arriving the driver stops after a fixed number of rounds
//! and leaves the rest for the next run.
//!
//! Export is withheld while any edit is still pending (not acknowledged by
//! Bear, or left over when the round limit was hit). Files that fail to
//! reconcile outright are logged and skipped; their incoming copy is already
//! in the backup folder.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{STAGING_MARKER, SyncConfig};
use crate::storage::{NoteStore, database_mtime};
use crate::sync::command::CommandSink;
use crate::sync::detect::{detect_changed, peek_changed};
use crate::sync::export::Exporter;
use crate::sync::file::{MirrorStats, clean_staging, set_mtime};
use crate::sync::log::ActionLog;
use crate::sync::publish::{PublishedDestination, mirror_images, publish};
use crate::sync::reconcile::{Reconciler, backup_incoming, backup_unit};
use crate::sync::state::SyncMarkers;
use crate::sync::types::{ExportStats, ReconcileStats, SyncError, SyncResult};

/// What a sync pass did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    /// Reconciliation rounds that found external changes.
    pub rounds: u32,
    /// Changes were still arriving when the round limit was hit.
    pub gave_up: bool,
    pub reconcile: ReconcileStats,
    /// The database changed since the last export.
    pub db_modified: bool,
    /// Export was withheld because some external edits are still pending.
    pub export_withheld: bool,
    pub export: Option<ExportStats>,
    pub published: Vec<PublishedDestination>,
    pub images: Option<MirrorStats>,
}

/// Result of the export half of a pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportReport {
    pub stats: ExportStats,
    /// Pending edits copied to the backup folder before being overwritten.
    pub backed_up: Vec<PathBuf>,
    pub published: Vec<PublishedDestination>,
    pub images: Option<MirrorStats>,
}

/// Whether the database changed since the last export.
///
/// True when there is no sync marker yet, so the first run always exports.
#[must_use]
pub fn check_db_modified(config: &SyncConfig) -> bool {
    let markers = SyncMarkers::new(&config.export_path);
    if markers.last_sync_check().is_none() {
        return true;
    }
    match (database_mtime(&config.database_path), markers.last_export()) {
        (Some(db), Some(exported)) => db > exported,
        (_, None) => true,
        (None, Some(_)) => false,
    }
}

/// Runs sync passes against one configuration.
pub struct SyncDriver<'a> {
    config: &'a SyncConfig,
    sink: &'a mut dyn CommandSink,
    log: ActionLog,
}

impl<'a> SyncDriver<'a> {
    pub fn new(config: &'a SyncConfig, sink: &'a mut dyn CommandSink) -> Self {
        Self {
            config,
            sink,
            log: ActionLog::new(config),
        }
    }

    /// Reconcile external edits, then export if the database changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, the staging path
    /// is unsafe, or the export or publish fails.
    pub fn run(&mut self) -> SyncResult<SyncReport> {
        let store = NoteStore::open(&self.config.database_path)?;
        let mut report = SyncReport::default();

        self.reconcile_external(&store, &mut report)?;

        if !report.reconcile.failed.is_empty() {
            report.export_withheld = true;
            warn!(
                pending = report.reconcile.failed.len(),
                "Some external edits are still pending, skipping export"
            );
            return Ok(report);
        }

        report.db_modified = check_db_modified(self.config);
        if !report.db_modified {
            debug!("No database changes found");
            return Ok(report);
        }

        let exported = self.export_and_publish(&store)?;
        report.export = Some(exported.stats);
        report.published = exported.published;
        report.images = exported.images;
        Ok(report)
    }

    /// The bounded check-and-reconcile loop.
    fn reconcile_external(&mut self, store: &NoteStore, report: &mut SyncReport) -> SyncResult<()> {
        let max_rounds = self.config.max_reconcile_rounds;

        while let Some(changes) = detect_changed(&self.config.export_path, SystemTime::now())? {
            if changes.is_empty() {
                break;
            }
            if report.rounds >= max_rounds {
                warn!(
                    rounds = report.rounds,
                    remaining = changes.files.len(),
                    "Changes still arriving, giving up until next run"
                );
                report.gave_up = true;
                report.reconcile.failed.extend(changes.files);
                break;
            }

            report.rounds += 1;
            info!(round = report.rounds, files = changes.files.len(), "External changes found");
            // Let the sync client finish downloading
            thread::sleep(self.config.download_settle());

            let pass = Reconciler::new(self.config, store, &mut *self.sink, &self.log)
                .reconcile_all(&changes);
            report.reconcile.merge(pass);

            // Give Bear time to apply the commands
            thread::sleep(self.config.reconcile_settle());
        }

        keep_pending(&report.reconcile.failed);
        Ok(())
    }

    /// Clean staging, export, write markers, publish and mirror images.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. Nothing is deleted from a staging
    /// path without the staging marker.
    pub fn export_and_publish(&self, store: &NoteStore) -> SyncResult<ExportReport> {
        let config = self.config;
        let started = SystemTime::now();

        clean_staging(&config.staging_path, STAGING_MARKER)?;
        let snapshot = store.snapshot()?;
        let stats = Exporter::new(config).export_snapshot(&snapshot)?;

        // Markers use the start time so edits made during the export are seen next run
        SyncMarkers::new(&config.staging_path).write_both(started)?;

        let published = publish(
            &config.staging_path,
            &config.destinations(),
            &config.assets_dir_name,
        )?;
        let images = mirror_images(config)?;

        info!(
            files = stats.files_written,
            dest = %config.export_path.display(),
            "Export published"
        );
        self.log.record(&format!(
            "{} notes exported to: {}",
            stats.files_written,
            config.export_path.display()
        ));

        Ok(ExportReport {
            stats,
            backed_up: Vec::new(),
            published,
            images,
        })
    }

    /// Export without importing external edits first.
    ///
    /// Files edited since the last sync would be overwritten, so the export
    /// is refused while any are pending unless `force` is set. With `force`
    /// each pending file (or its package) is backed up first.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::PendingEdits` if edits are pending and `force` is
    /// not set, or any error from backup, export or publish.
    pub fn export_only(&self, store: &NoteStore, force: bool) -> SyncResult<ExportReport> {
        let pending = peek_changed(&self.config.export_path)?
            .map(|changes| changes.files)
            .unwrap_or_default();

        if !pending.is_empty() && !force {
            return Err(SyncError::PendingEdits {
                count: pending.len(),
            });
        }

        let backed_up = self.backup_pending(&pending)?;
        let mut report = self.export_and_publish(store)?;
        report.backed_up = backed_up;
        Ok(report)
    }

    /// Copy each pending file, or the package it belongs to, to the backup folder.
    fn backup_pending(&self, files: &[PathBuf]) -> SyncResult<Vec<PathBuf>> {
        let units: BTreeMap<&Path, &PathBuf> =
            files.iter().map(|path| (backup_unit(path), path)).collect();

        let mut backed_up = Vec::with_capacity(units.len());
        for path in units.into_values() {
            let target = backup_incoming(path, &self.config.backup_path)?;
            warn!(
                path = %path.display(),
                backup = %target.display(),
                "Overwriting unsynced edit, backed up"
            );
            self.log.record(&format!(
                "Unsynced edit backed up before export: {}",
                path.display()
            ));
            backed_up.push(target);
        }
        Ok(backed_up)
    }
}

/// Bump the mtime of files whose command was not acknowledged so the next
/// run finds them again.
fn keep_pending(files: &[PathBuf]) {
    let now = SystemTime::now();
    let unique: BTreeSet<&PathBuf> = files.iter().collect();
    for path in unique {
        if let Err(e) = set_mtime(path, now) {
            warn!(path = %path.display(), error = %e, "Could not mark file for retry");
        }
    }
}
