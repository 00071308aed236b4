//! Reconciliation of externally edited files.
//!
//! Each changed file is turned into a command for the notes app:
//!
//! - No identifier marker: a new note, tagged after its folder.
//! - Identifier of a note that also changed in Bear since the last export:
//!   a conflict. A separate note with a conflict banner is created and the
//!   original is left alone.
//! - Otherwise: the Bear note is backed up, then replaced.
//!
//! Files linking images that Bear did not generate are imported as
//! `.textbundle` packages instead. Every incoming file is copied to the
//! backup folder before anything else happens.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::model::{Note, clean_title};
use crate::storage::NoteStore;
use crate::sync::command::{CommandSink, NoteCommand, compose_payload, open_note_url};
use crate::sync::detect::ChangeSet;
use crate::sync::export::{find_identifier, strip_identifier, write_bundle_info};
use crate::sync::file::{
    backup_dir, backup_file, mtime, sequenced_path, set_mtime, write_with_mtime,
};
use crate::sync::images::{has_added_images, linked_assets, restore_image_refs};
use crate::sync::log::ActionLog;
use crate::sync::types::{FileReconciliation, ReconcileOutcome, ReconcileStats, SyncResult};
use crate::tags::{FileTags, append_tags, read_file_tags, restore_tags, tag_from_path};

/// Folder inside staging where plain files are converted to packages.
pub const IMPORT_DIR: &str = ".import";

static TITLE_HASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6} ").expect("valid regex"));

/// Insert `::<message>[<title>](<link>)::` as the second line.
#[must_use]
pub fn insert_link_line(text: &str, message: &str, scheme: &str, id: &str) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    let title = TITLE_HASHES.replace(lines.first().copied().unwrap_or_default(), "");
    let link = format!("::{message}[{title}]({})::", open_note_url(scheme, id));

    let at = lines.len().min(1);
    lines.insert(at, &link);
    lines.join("\n")
}

fn enclosing_bundle(path: &Path) -> Option<&Path> {
    path.parent()
        .filter(|p| p.extension().is_some_and(|e| e == "textbundle"))
}

/// Copy an incoming file, or its whole package, into `dir`.
///
/// # Errors
///
/// Returns an error if the copy fails.
pub fn backup_incoming(path: &Path, dir: &Path) -> SyncResult<PathBuf> {
    let target = match enclosing_bundle(path) {
        Some(bundle) => backup_dir(bundle, dir)?,
        None => backup_file(path, dir)?,
    };
    debug!(from = %path.display(), to = %target.display(), "Backed up incoming file");
    Ok(target)
}

/// The file itself, or the package it sits in.
#[must_use]
pub fn backup_unit(path: &Path) -> &Path {
    enclosing_bundle(path).unwrap_or(path)
}

fn local_stamp(time: SystemTime, format: &str) -> String {
    DateTime::<Local>::from(time).format(format).to_string()
}

/// Turns changed files into commands for the notes app.
pub struct Reconciler<'a> {
    config: &'a SyncConfig,
    store: &'a NoteStore,
    sink: &'a mut dyn CommandSink,
    log: &'a ActionLog,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: &'a SyncConfig,
        store: &'a NoteStore,
        sink: &'a mut dyn CommandSink,
        log: &'a ActionLog,
    ) -> Self {
        Self {
            config,
            store,
            sink,
            log,
        }
    }

    /// Reconcile every file in a change set.
    ///
    /// Per-file errors are logged, counted and skipped. Files whose command
    /// was not acknowledged are reported as failed so the caller can keep
    /// them pending.
    pub fn reconcile_all(&mut self, changes: &ChangeSet) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        for path in &changes.files {
            match self.reconcile(path, changes.last_export) {
                Ok(result) => {
                    if !result.acknowledged {
                        warn!(
                            path = %path.display(),
                            outcome = %result.outcome,
                            "Command not acknowledged"
                        );
                    }
                    stats.record(&result);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not reconcile file");
                    stats.record_error(path);
                }
            }
        }
        stats
    }

    /// Reconcile one changed file.
    ///
    /// `last_export` is when the export folder was last generated; a note
    /// modified in Bear after that is in conflict with the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, backed up or rewritten,
    /// or the database lookup fails.
    pub fn reconcile(
        &mut self,
        path: &Path,
        last_export: SystemTime,
    ) -> SyncResult<FileReconciliation> {
        let text = String::from_utf8_lossy(&fs::read(path)?).into_owned();
        let modified = mtime(path).unwrap_or_else(SystemTime::now);

        backup_incoming(path, &self.config.backup_path)?;

        let (outcome, acknowledged) = if has_added_images(&text) {
            let acknowledged = self.import_package(path, &text, modified)?;
            if acknowledged {
                self.log.record(&format!("Imported to Bear: {}", path.display()));
            }
            (ReconcileOutcome::PackageImported, acknowledged)
        } else {
            let (outcome, acknowledged) = self.update_note(path, &text, modified, last_export)?;
            if acknowledged {
                self.log.record(&format!("Bear Note Updated: {}", path.display()));
            }
            (outcome, acknowledged)
        };

        info!(path = %path.display(), %outcome, acknowledged, "Reconciled file");
        Ok(FileReconciliation {
            path: path.to_path_buf(),
            outcome,
            acknowledged,
        })
    }

    fn update_note(
        &mut self,
        path: &Path,
        text: &str,
        modified: SystemTime,
        last_export: SystemTime,
    ) -> SyncResult<(ReconcileOutcome, bool)> {
        let text = restore_tags(text, self.config.tag_visibility());
        let text = restore_image_refs(&text, self.config.image_mode, &self.config.assets_dir_name);

        let Some(id) = find_identifier(&text) else {
            let text = self.with_path_tags(&text, path);
            let acknowledged = self.dispatch(&NoteCommand::Create {
                text: compose_payload(&text, None, None),
            });
            return Ok((ReconcileOutcome::ImportedAsNew, acknowledged));
        };

        let text = strip_identifier(&text, &id);
        let Some(note) = self.store.get_active_note(&id)? else {
            warn!(
                note_id = %id,
                path = %path.display(),
                "Note missing or trashed, importing as new"
            );
            self.log.record(&format!(
                "Original note missing, imported as new: {}",
                path.display()
            ));
            let acknowledged = self.dispatch(&NoteCommand::Create {
                text: compose_payload(&text, None, None),
            });
            return Ok((ReconcileOutcome::ImportedAsNew, acknowledged));
        };

        if note.modified_time() > last_export {
            let banner = format!(
                "::Sync conflict! External update: {}::\n[Click here to see original Bear note]({})",
                local_stamp(modified, "%Y-%m-%d at %H:%M"),
                open_note_url(&self.config.url_scheme, &id)
            );
            warn!(note_id = %id, path = %path.display(), "Sync conflict, creating separate note");
            self.log.record(&format!("Sync conflict: {}", path.display()));
            let acknowledged = self.dispatch(&NoteCommand::Create {
                text: compose_payload(&text, Some(&banner), None),
            });
            return Ok((ReconcileOutcome::ConflictFlagged, acknowledged));
        }

        self.backup_note(&note)?;
        let acknowledged = self.dispatch(&NoteCommand::Replace {
            id: id.clone(),
            text: compose_payload(&text, None, Some(&note.title)),
        });
        Ok((ReconcileOutcome::AttachedToExisting, acknowledged))
    }

    /// Save the database copy of a note before it is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup cannot be written.
    pub fn backup_note(&self, note: &Note) -> SyncResult<PathBuf> {
        let text = insert_link_line(
            note.body.trim_end(),
            "Link to updated note: ",
            &self.config.url_scheme,
            &note.id,
        );
        let path = sequenced_path(
            &self.config.backup_path,
            &clean_title(&note.title),
            "txt",
            |_| false,
        );
        write_with_mtime(&path, &text, note.modified_time())?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.log.record(&format!("Original to sync_backup: {name}"));
        debug!(note_id = %note.id, backup = %path.display(), "Backed up note");
        Ok(path)
    }

    /// Import a file with new images by opening it as a package.
    fn import_package(
        &mut self,
        path: &Path,
        text: &str,
        modified: SystemTime,
    ) -> SyncResult<bool> {
        let (bundle, text_path) = match enclosing_bundle(path) {
            Some(bundle) => (bundle.to_path_buf(), path.to_path_buf()),
            None => {
                let bundle = self.convert_to_bundle(path, text, modified)?;
                let text_path = bundle.join("text.md");
                (bundle, text_path)
            }
        };

        let text = restore_tags(text, self.config.tag_visibility());
        let text = match find_identifier(&text) {
            Some(id) => insert_link_line(
                &strip_identifier(&text, &id),
                "Images added! Link to original note: ",
                &self.config.url_scheme,
                &id,
            ),
            None => self.with_path_tags(&text, path),
        };

        write_with_mtime(&text_path, &text, modified)?;
        set_mtime(&bundle, modified)?;

        Ok(self.dispatch(&NoteCommand::OpenPackage { path: bundle }))
    }

    /// Build `<staging>/.import/<stem>.textbundle` from a plain file and its assets.
    fn convert_to_bundle(
        &self,
        path: &Path,
        text: &str,
        modified: SystemTime,
    ) -> SyncResult<PathBuf> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bundle = sequenced_path(
            &self.config.staging_path.join(IMPORT_DIR),
            &stem,
            "textbundle",
            |_| false,
        );
        let assets = bundle.join("assets");
        fs::create_dir_all(&assets)?;

        let source_dir = path.parent().unwrap_or_else(|| Path::new("")).join("assets");
        for name in linked_assets(text) {
            let source = source_dir.join(&name);
            if source.is_file() {
                let target = assets.join(&name);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&source, target)?;
            } else {
                warn!(path = %path.display(), image = %name, "Linked image not found");
            }
        }

        write_bundle_info(&bundle, modified)?;
        debug!(from = %path.display(), bundle = %bundle.display(), "Converted file to package");
        Ok(bundle)
    }

    /// Append the folder tag and any Finder tags of the file.
    fn with_path_tags(&self, text: &str, path: &Path) -> String {
        let relative = path.strip_prefix(&self.config.export_path).unwrap_or(path);
        let mut tags = vec![tag_from_path(relative)];

        match read_file_tags(path) {
            FileTags::Failed(reason) => {
                warn!(path = %path.display(), %reason, "Finder tags unreadable");
            }
            found => tags.extend(found.into_note_tags()),
        }

        append_tags(text, &tags)
    }

    fn dispatch(&mut self, command: &NoteCommand) -> bool {
        debug!(command = command.kind(), "Sending command");
        self.sink.dispatch(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DB_EPOCH_OFFSET_SECS, unix_to_system_time};
    use crate::sync::command::RecordingSink;
    use crate::test_utils::{FixtureNote, TestEnv};

    fn db_time(db_seconds: f64) -> SystemTime {
        unix_to_system_time(db_seconds + DB_EPOCH_OFFSET_SECS).unwrap()
    }

    const GROCERIES: &str = "Groceries\nBuy milk\n<!-- #.inbox -->\n\n<!-- {NoteID:abc123} -->\n";

    #[test]
    fn test_insert_link_line() {
        assert_eq!(
            insert_link_line("# Groceries\nBuy milk", "Link to updated note: ", "bear", "abc"),
            "# Groceries\n::Link to updated note: [Groceries](bear://x-callback-url/open-note?id=abc)::\nBuy milk"
        );
    }

    #[test]
    fn test_scenario_c_replace_with_backup() {
        let env = TestEnv::with_notes(&[FixtureNote::new(
            "abc123",
            "Groceries",
            "Groceries\nBuy milk\n#.inbox",
            100.0,
        )]);
        let edited = GROCERIES.replace("Buy milk", "Buy milk and eggs");
        let file = env.write_export("_inbox/Groceries.md", &edited);
        let store = env.store();
        let log = ActionLog::disabled();
        let mut sink = RecordingSink::new();

        let result = Reconciler::new(&env.config, &store, &mut sink, &log)
            .reconcile(&file, db_time(200.0))
            .unwrap();

        assert_eq!(result.outcome, ReconcileOutcome::AttachedToExisting);
        assert!(result.acknowledged);
        let [NoteCommand::Replace { id, text }] = sink.commands.as_slice() else {
            panic!("expected one replace, got {:?}", sink.commands);
        };
        assert_eq!(id, "abc123");
        assert!(text.contains("Buy milk and eggs"));
        assert!(text.contains("\n#.inbox"));
        assert!(!text.contains("NoteID"));
        assert!(!text.starts_with("Groceries"));

        let backup = fs::read_to_string(env.config.backup_path.join("Groceries.txt")).unwrap();
        assert!(backup.contains("Buy milk\n"));
        assert!(!backup.contains("eggs"));
        assert!(backup.contains("::Link to updated note: [Groceries]("));
        // Incoming file backed up too
        assert!(env.config.backup_path.join("Groceries.md").exists());
    }

    /// Reads the note backup at the moment a replace arrives.
    struct BackupWatcher {
        backup: PathBuf,
        seen_at_replace: Option<String>,
    }

    impl CommandSink for BackupWatcher {
        fn dispatch(&mut self, command: &NoteCommand) -> bool {
            if matches!(command, NoteCommand::Replace { .. }) {
                self.seen_at_replace = fs::read_to_string(&self.backup).ok();
            }
            true
        }
    }

    #[test]
    fn test_note_backed_up_before_replace_is_sent() {
        let env = TestEnv::with_notes(&[FixtureNote::new(
            "abc123",
            "Groceries",
            "Groceries\nBuy milk\n#.inbox",
            100.0,
        )]);
        let edited = GROCERIES.replace("Buy milk", "Buy milk and eggs");
        let file = env.write_export("_inbox/Groceries.md", &edited);
        let store = env.store();
        let log = ActionLog::disabled();
        let mut sink = BackupWatcher {
            backup: env.config.backup_path.join("Groceries.txt"),
            seen_at_replace: None,
        };

        Reconciler::new(&env.config, &store, &mut sink, &log)
            .reconcile(&file, db_time(200.0))
            .unwrap();

        let backup = sink.seen_at_replace.expect("backup missing when replace was sent");
        assert!(backup.contains("Buy milk\n"));
        assert!(!backup.contains("eggs"));
    }

    #[test]
    fn test_conflict_creates_new_note() {
        let env = TestEnv::with_notes(&[FixtureNote::new(
            "abc123",
            "Groceries",
            "Groceries\nBuy bread",
            300.0,
        )]);
        let file = env.write_export("_inbox/Groceries.md", GROCERIES);
        let store = env.store();
        let log = ActionLog::disabled();
        let mut sink = RecordingSink::new();

        let result = Reconciler::new(&env.config, &store, &mut sink, &log)
            .reconcile(&file, db_time(200.0))
            .unwrap();

        assert_eq!(result.outcome, ReconcileOutcome::ConflictFlagged);
        let [NoteCommand::Create { text }] = sink.commands.as_slice() else {
            panic!("expected one create, got {:?}", sink.commands);
        };
        assert!(text.starts_with("Groceries\n::Sync conflict! External update: "));
        assert!(text.contains(
            "[Click here to see original Bear note](bear://x-callback-url/open-note?id=abc123)"
        ));
        assert!(!env.config.backup_path.join("Groceries.txt").exists());
    }

    #[test]
    fn test_new_file_gets_folder_tag() {
        let env = TestEnv::with_notes(&[]);
        let file = env.write_export("work/projects/Idea.md", "Idea\nSomething new");
        let store = env.store();
        let log = ActionLog::disabled();
        let mut sink = RecordingSink::new();

        let result = Reconciler::new(&env.config, &store, &mut sink, &log)
            .reconcile(&file, db_time(200.0))
            .unwrap();

        assert_eq!(result.outcome, ReconcileOutcome::ImportedAsNew);
        assert_eq!(
            sink.commands,
            vec![NoteCommand::Create {
                text: "Idea\nSomething new\n\n#work/projects".into()
            }]
        );
    }

    #[test]
    fn test_missing_note_imports_as_new() {
        let trashed =
            FixtureNote::new("abc123", "Groceries", "Groceries\nBuy milk", 100.0).trashed();
        let env = TestEnv::with_notes(&[trashed]);
        let file = env.write_export("_inbox/Groceries.md", GROCERIES);
        let store = env.store();
        let log = ActionLog::disabled();
        let mut sink = RecordingSink::new();

        let result = Reconciler::new(&env.config, &store, &mut sink, &log)
            .reconcile(&file, db_time(200.0))
            .unwrap();

        assert_eq!(result.outcome, ReconcileOutcome::ImportedAsNew);
        assert!(matches!(sink.commands.as_slice(), [NoteCommand::Create { .. }]));
    }

    #[test]
    fn test_added_image_opens_package() {
        let env = TestEnv::with_notes(&[]);
        env.write_export("trips/assets/holiday_beach.jpg", "jpeg");
        let file = env.write_export("trips/Beach.md", "Beach\n![](assets/holiday_beach.jpg)");
        let store = env.store();
        let log = ActionLog::disabled();
        let mut sink = RecordingSink::new();

        let result = Reconciler::new(&env.config, &store, &mut sink, &log)
            .reconcile(&file, db_time(200.0))
            .unwrap();

        assert_eq!(result.outcome, ReconcileOutcome::PackageImported);
        let bundle = env.config.staging_path.join(".import/Beach.textbundle");
        assert_eq!(sink.commands, vec![NoteCommand::OpenPackage { path: bundle.clone() }]);
        assert!(bundle.join("assets/holiday_beach.jpg").exists());
        assert!(bundle.join("info.json").exists());
        let text = fs::read_to_string(bundle.join("text.md")).unwrap();
        assert!(text.ends_with("\n\n#trips\n"));
    }

    #[test]
    fn test_added_image_in_subfolder_opens_package() {
        let env = TestEnv::with_notes(&[]);
        env.write_export("trips/assets/sub/holiday_x.png", "png");
        let file = env.write_export("trips/Beach.md", "Beach\n![](assets/sub/holiday_x.png)");
        let store = env.store();
        let log = ActionLog::disabled();
        let mut sink = RecordingSink::new();

        let result = Reconciler::new(&env.config, &store, &mut sink, &log)
            .reconcile(&file, db_time(200.0))
            .unwrap();

        assert_eq!(result.outcome, ReconcileOutcome::PackageImported);
        let bundle = env.config.staging_path.join(".import/Beach.textbundle");
        assert!(bundle.join("assets/sub/holiday_x.png").exists());
    }

    #[test]
    fn test_unwritable_backup_folder_skips_file() {
        let mut env = TestEnv::with_notes(&[]);
        let blocked = env.root().join("blocked");
        fs::write(&blocked, "not a directory").unwrap();
        env.config.backup_path = blocked;
        let file = env.write_export("Loose.md", "Loose\nthought");
        let store = env.store();
        let log = ActionLog::disabled();
        let mut sink = RecordingSink::new();

        let changes = ChangeSet {
            files: vec![file.clone()],
            last_sync_check: db_time(0.0),
            last_export: db_time(0.0),
        };
        let stats = Reconciler::new(&env.config, &store, &mut sink, &log).reconcile_all(&changes);

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.skipped, vec![file]);
        assert!(stats.failed.is_empty());
        assert!(sink.commands.is_empty());
    }

    #[test]
    fn test_rejected_command_is_reported() {
        let env = TestEnv::with_notes(&[]);
        let file = env.write_export("Loose.md", "Loose\nthought");
        let store = env.store();
        let log = ActionLog::disabled();
        let mut sink = RecordingSink::rejecting();

        let changes = ChangeSet {
            files: vec![file.clone()],
            last_sync_check: db_time(0.0),
            last_export: db_time(0.0),
        };
        let stats = Reconciler::new(&env.config, &store, &mut sink, &log).reconcile_all(&changes);

        assert_eq!(stats.total(), 0);
        assert_eq!(stats.failed, vec![file]);
        assert!(stats.skipped.is_empty());
    }
}
