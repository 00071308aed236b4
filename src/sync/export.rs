//! Markdown export.
//!
//! This module writes every exportable note into the staging folder.
//!
//! # Placement
//!
//! Each note lands in the folder of its first tag (or every tag, in
//! multi-folder mode), or at the root when it has none. Tag filters can
//! leave a note out entirely. Titles that collide within one folder get
//! ` - 02`, ` - 03`… suffixes; notes are processed in creation order so the
//! suffixes are stable across runs.
//!
//! # Identity
//!
//! Each file ends with `<!-- {NoteID:<id>} -->`. This is what maps an
//! externally edited file back to its note during reconciliation.
//!
//! # Timestamps
//!
//! Files get the note's modification time, converted from the database
//! epoch. Exporting the same database twice yields identical files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ImageMode, SyncConfig};
use crate::model::Note;
use crate::storage::Snapshot;
use crate::sync::file::{sequenced_path, set_mtime, write_with_mtime};
use crate::sync::images::{
    bundle_asset_name, has_images, image_refs, to_bundle_refs, to_shared_refs,
};
use crate::sync::types::{ExportStats, SyncResult};
use crate::tags::{Placement, hide_tags, resolve_placement};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{NoteID:(.+?)\}").expect("valid regex"));

/// Append the identifier marker to exported text.
#[must_use]
pub fn embed_identifier(text: &str, id: &str) -> String {
    format!("{text}\n\n<!-- {{NoteID:{id}}} -->\n")
}

/// The note identifier embedded in a file, if any.
#[must_use]
pub fn find_identifier(text: &str) -> Option<String> {
    IDENTIFIER
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Remove the identifier marker, leaving the text with one trailing newline.
#[must_use]
pub fn strip_identifier(text: &str, id: &str) -> String {
    let pattern = format!(r"<!-- ?\{{NoteID:{}\}} ?-->", regex::escape(id));
    let stripped = match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(_) => text.to_string(),
    };
    format!("{}\n", stripped.trim_end())
}

/// `info.json` of a `.textbundle` package.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleInfo {
    transient: bool,
    #[serde(rename = "type")]
    kind: &'static str,
    creator_identifier: &'static str,
    version: u8,
}

impl Default for BundleInfo {
    fn default() -> Self {
        Self {
            transient: true,
            kind: "net.daringfireball.markdown",
            creator_identifier: "net.shinyfrog.bear",
            version: 2,
        }
    }
}

/// Write a package's `info.json`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_bundle_info(bundle: &Path, mtime: SystemTime) -> SyncResult<()> {
    let info = serde_json::to_string_pretty(&BundleInfo::default())?;
    write_with_mtime(&bundle.join("info.json"), &info, mtime)
}

/// Shape of one exported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Markdown,
    Bundle,
}

/// One file the exporter will write for a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// `.md` file or `.textbundle` directory.
    pub path: PathBuf,
    /// Final text, with tags hidden, images rewritten and identifier embedded.
    pub body: String,
    pub modified_at: SystemTime,
    pub note_id: String,
    pub kind: ExportKind,
    /// Database image references to copy into a package.
    pub images: Vec<String>,
}

/// Writes notes into the staging folder.
pub struct Exporter<'a> {
    config: &'a SyncConfig,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub const fn new(config: &'a SyncConfig) -> Self {
        Self { config }
    }

    /// Export a database snapshot, counting its unreadable rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written.
    pub fn export_snapshot(&self, snapshot: &Snapshot) -> SyncResult<ExportStats> {
        let mut stats = self.export(&snapshot.notes)?;
        stats.unreadable = snapshot.unreadable.len();
        Ok(stats)
    }

    /// Write every exportable note. Returns what was written.
    ///
    /// The staging folder is expected to be empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written. Missing images are
    /// logged and counted, not returned.
    pub fn export(&self, notes: &[Note]) -> SyncResult<ExportStats> {
        let mut ordered: Vec<&Note> = notes.iter().filter(|n| !n.trashed).collect();
        ordered.sort_by(|a, b| {
            a.created_at
                .total_cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut stats = ExportStats {
            notes: ordered.len(),
            ..ExportStats::default()
        };
        let mut taken: HashSet<PathBuf> = HashSet::new();

        for note in ordered {
            let files = self.plan(note, &mut taken);
            if files.is_empty() {
                stats.skipped += 1;
                continue;
            }
            for file in &files {
                self.write(file, &mut stats)?;
                stats.files_written += 1;
            }
        }

        info!(
            written = stats.files_written,
            skipped = stats.skipped,
            staging = %self.config.staging_path.display(),
            "Exported notes"
        );
        Ok(stats)
    }

    /// Decide which files a note becomes. Empty when filtered out.
    pub fn plan(&self, note: &Note, taken: &mut HashSet<PathBuf>) -> Vec<ExportedFile> {
        let folders = match resolve_placement(&note.body, &self.config.tag_rules()) {
            Placement::Folders(folders) => folders,
            Placement::Skip(reason) => {
                debug!(note_id = %note.id, ?reason, "Note not exported");
                return Vec::new();
            }
        };

        let hidden = hide_tags(note.body.trim_end(), self.config.tag_visibility());
        let text = embed_identifier(&hidden, &note.id);
        let stem = note.file_stem();
        let modified_at = note.modified_time();

        folders
            .into_iter()
            .map(|folder| {
                let dir = self.config.staging_path.join(&folder);
                let bundle = self.config.image_mode == ImageMode::Bundle
                    && (!self.config.bundle_only_with_images || has_images(&text));

                let (kind, ext, body, images) = if bundle {
                    (ExportKind::Bundle, "textbundle", to_bundle_refs(&text), image_refs(&text))
                } else {
                    let body = match self.config.image_mode {
                        ImageMode::SharedRepository => to_shared_refs(
                            &text,
                            folder.components().count(),
                            &self.config.assets_dir_name,
                        ),
                        ImageMode::Plain | ImageMode::Bundle => text.clone(),
                    };
                    (ExportKind::Markdown, "md", body, Vec::new())
                };

                let path = sequenced_path(&dir, &stem, ext, |p| taken.contains(p));
                taken.insert(path.clone());

                ExportedFile {
                    path,
                    body,
                    modified_at,
                    note_id: note.id.clone(),
                    kind,
                    images,
                }
            })
            .collect()
    }

    fn write(&self, file: &ExportedFile, stats: &mut ExportStats) -> SyncResult<()> {
        match file.kind {
            ExportKind::Markdown => write_with_mtime(&file.path, &file.body, file.modified_at),
            ExportKind::Bundle => self.write_bundle(file, stats),
        }
    }

    fn write_bundle(&self, file: &ExportedFile, stats: &mut ExportStats) -> SyncResult<()> {
        let assets = file.path.join("assets");
        fs::create_dir_all(&assets)?;

        for reference in &file.images {
            let source = self.config.image_source_path.join(reference);
            let target = assets.join(bundle_asset_name(reference));
            if !source.is_file() {
                warn!(note_id = %file.note_id, image = %reference, "Image file missing");
                stats.missing_images += 1;
                continue;
            }
            fs::copy(&source, &target)?;
            if let Ok(modified) = fs::metadata(&source).and_then(|m| m.modified()) {
                set_mtime(&target, modified)?;
            }
            stats.images_copied += 1;
        }

        write_with_mtime(&file.path.join("text.md"), &file.body, file.modified_at)?;
        write_bundle_info(&file.path, file.modified_at)?;
        set_mtime(&assets, file.modified_at)?;
        set_mtime(&file.path, file.modified_at)
    }
}
