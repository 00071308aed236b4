//! File operations for sync.
//!
//! This module provides the filesystem primitives the sync passes rely on:
//! - Write-then-set-mtime, so exported files carry their note's timestamp
//! - A guarded staging wipe that refuses paths without the staging marker
//! - A mirrored copy (`rsync -r -t [--delete]` semantics) with excludes
//! - Sequence-numbered paths for append-only backups

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::sync::types::{SyncError, SyncResult};

/// Destination entries a delete-aware mirror never removes.
pub const MIRROR_EXCLUDES: [&str; 2] = [".Ulysses*", "*.Ulysses_Public_Filter"];

/// Write content, creating parent directories, then set the file's mtime.
///
/// # Errors
///
/// Returns an error if the file cannot be written or its time set.
pub fn write_with_mtime(path: &Path, content: &str, mtime: SystemTime) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    set_mtime(path, mtime)
}

/// Set the modification time of a file or directory.
///
/// # Errors
///
/// Returns an error if the path cannot be opened or its time set.
pub fn set_mtime(path: &Path, mtime: SystemTime) -> SyncResult<()> {
    let file = File::open(path)?;
    file.set_modified(mtime)?;
    Ok(())
}

/// Modification time of a path, or `None` if it does not exist.
#[must_use]
pub fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Fail unless `path` contains the staging marker.
///
/// # Errors
///
/// Returns `UnsafePath` when the marker is missing.
pub fn ensure_staging_path(path: &Path, marker: &str) -> SyncResult<()> {
    if path.to_string_lossy().contains(marker) {
        Ok(())
    } else {
        Err(SyncError::UnsafePath {
            path: path.to_path_buf(),
            marker: marker.to_string(),
        })
    }
}

/// Empty the staging folder, recreating it.
///
/// Nothing is deleted unless the path contains `marker`.
///
/// # Errors
///
/// Returns `UnsafePath` for an unmarked path, or an IO error.
pub fn clean_staging(path: &Path, marker: &str) -> SyncResult<()> {
    ensure_staging_path(path, marker)?;

    if path.exists() {
        debug!(path = %path.display(), "Removing old staging files");
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Next free `<dir>/<stem>.<ext>`, then `<stem> - 02.<ext>`, `<stem> - 03.<ext>`…
///
/// `taken` lets callers reserve paths that are not yet on disk.
#[must_use]
pub fn sequenced_path(dir: &Path, stem: &str, ext: &str, taken: impl Fn(&Path) -> bool) -> PathBuf {
    let name = |suffix: &str| {
        if ext.is_empty() {
            format!("{stem}{suffix}")
        } else {
            format!("{stem}{suffix}.{ext}")
        }
    };

    let mut candidate = dir.join(name(""));
    let mut count = 2;
    while candidate.exists() || taken(&candidate) {
        candidate = dir.join(name(&format!(" - {count:02}")));
        count += 1;
    }
    candidate
}

/// Shell-style name patterns (`*`, `?`); a trailing `/` limits a pattern to directories.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<(Regex, bool)>,
}

static GLOB_SPECIAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*?]").expect("valid regex"));

impl ExcludeSet {
    /// # Errors
    ///
    /// Returns an error if a pattern translates to an invalid regex.
    pub fn new<S: AsRef<str>>(globs: &[S]) -> SyncResult<Self> {
        let mut patterns = Vec::with_capacity(globs.len());
        for glob in globs {
            let glob = glob.as_ref();
            let (glob, dir_only) = glob
                .strip_suffix('/')
                .map_or((glob, false), |g| (g, true));

            let mut source = String::from("^");
            let mut last = 0;
            for m in GLOB_SPECIAL.find_iter(glob) {
                source.push_str(&regex::escape(&glob[last..m.start()]));
                source.push_str(if m.as_str() == "*" { ".*" } else { "." });
                last = m.end();
            }
            source.push_str(&regex::escape(&glob[last..]));
            source.push('$');

            let re = Regex::new(&source).map_err(|e| SyncError::Walk(e.to_string()))?;
            patterns.push((re, dir_only));
        }
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn is_excluded(&self, name: &str, is_dir: bool) -> bool {
        self.patterns
            .iter()
            .any(|(re, dir_only)| (!dir_only || is_dir) && re.is_match(name))
    }
}

/// Options for [`mirror_dir`].
#[derive(Debug, Clone, Default)]
pub struct MirrorOptions {
    /// Delete destination entries that are not in the source.
    pub delete_missing: bool,
    pub excludes: ExcludeSet,
}

/// What a mirror pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorStats {
    pub copied: usize,
    pub deleted: usize,
}

fn entry_excluded(entry: &walkdir::DirEntry, excludes: &ExcludeSet) -> bool {
    excludes.is_excluded(&entry.file_name().to_string_lossy(), entry.file_type().is_dir())
}

fn needs_copy(src: &fs::Metadata, dst: &Path) -> bool {
    let Ok(existing) = fs::metadata(dst) else {
        return true;
    };
    existing.len() != src.len() || existing.modified().ok() != src.modified().ok()
}

/// Copy `src` into `dst` recursively, keeping modification times.
///
/// A file is copied when the destination is missing or differs in size or
/// mtime. The source is only read, never modified.
///
/// # Errors
///
/// Returns an error if traversal or any copy fails.
pub fn mirror_dir(src: &Path, dst: &Path, options: &MirrorOptions) -> SyncResult<MirrorStats> {
    let mut stats = MirrorStats::default();
    fs::create_dir_all(dst)?;

    let mut dirs = Vec::new();
    let mut walker = WalkDir::new(src).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        if entry_excluded(&entry, &options.excludes) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| SyncError::Walk(e.to_string()))?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            dirs.push((target, entry.metadata()?.modified()?));
        } else if entry.file_type().is_file() {
            let meta = entry.metadata()?;
            if needs_copy(&meta, &target) {
                if target.is_dir() {
                    fs::remove_dir_all(&target)?;
                }
                fs::copy(entry.path(), &target)?;
                set_mtime(&target, meta.modified()?)?;
                stats.copied += 1;
            }
        }
    }

    if options.delete_missing {
        stats.deleted = delete_missing(src, dst, &options.excludes)?;
    }

    // Deepest first: writing into a directory changes its mtime
    for (dir, modified) in dirs.iter().rev() {
        set_mtime(dir, *modified)?;
    }

    if stats.copied > 0 || stats.deleted > 0 {
        info!(
            src = %src.display(),
            dst = %dst.display(),
            copied = stats.copied,
            deleted = stats.deleted,
            "Mirrored directory"
        );
    }
    Ok(stats)
}

fn delete_missing(src: &Path, dst: &Path, excludes: &ExcludeSet) -> SyncResult<usize> {
    let mut doomed = Vec::new();
    let mut walker = WalkDir::new(dst).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        let is_dir = entry.file_type().is_dir();
        if entry_excluded(&entry, excludes) {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(dst)
            .map_err(|e| SyncError::Walk(e.to_string()))?;
        if !src.join(rel).exists() {
            doomed.push((entry.path().to_path_buf(), is_dir));
            if is_dir {
                walker.skip_current_dir();
            }
        }
    }

    for (path, is_dir) in &doomed {
        debug!(path = %path.display(), "Deleting destination-only entry");
        if *is_dir {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
    }
    Ok(doomed.len())
}

/// Copy a file into `dir` under a sequence-numbered name. Returns the new path.
///
/// # Errors
///
/// Returns an error if the copy fails.
pub fn backup_file(src: &Path, dir: &Path) -> SyncResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = src
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let target = sequenced_path(dir, &stem, &ext, |_| false);
    fs::copy(src, &target)?;
    if let Some(modified) = mtime(src) {
        set_mtime(&target, modified)?;
    }
    Ok(target)
}

/// Copy a whole directory into `dir` under a sequence-numbered name.
///
/// # Errors
///
/// Returns an error if the copy fails.
pub fn backup_dir(src: &Path, dir: &Path) -> SyncResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = src
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let target = sequenced_path(dir, &stem, &ext, |_| false);
    mirror_dir(src, &target, &MirrorOptions::default())?;
    if let Some(modified) = mtime(src) {
        set_mtime(&target, modified)?;
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_write_with_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a/b/note.md");

        write_with_mtime(&path, "hello", at(1_000_000)).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert_eq!(mtime(&path).unwrap(), at(1_000_000));
    }

    #[test]
    fn test_clean_staging_refuses_unmarked_path() {
        let temp_dir = TempDir::new().unwrap();
        let precious = temp_dir.path().join("Documents");
        fs::create_dir_all(&precious).unwrap();
        fs::write(precious.join("thesis.md"), "years of work").unwrap();

        let result = clean_staging(&precious, "BearExportTemp");

        assert!(matches!(result, Err(SyncError::UnsafePath { .. })));
        assert!(precious.join("thesis.md").exists());
    }

    #[test]
    fn test_clean_staging_empties_marked_path() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("BearExportTemp");
        fs::create_dir_all(staging.join("old")).unwrap();
        fs::write(staging.join("old/stale.md"), "x").unwrap();

        clean_staging(&staging, "BearExportTemp").unwrap();

        assert!(staging.is_dir());
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[test]
    fn test_sequenced_path() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        let first = sequenced_path(dir, "Draft", "md", |_| false);
        assert_eq!(first, dir.join("Draft.md"));
        fs::write(&first, "").unwrap();

        let second = sequenced_path(dir, "Draft", "md", |_| false);
        assert_eq!(second, dir.join("Draft - 02.md"));

        let third = sequenced_path(dir, "Draft", "md", |p| p == second);
        assert_eq!(third, dir.join("Draft - 03.md"));
    }

    #[test]
    fn test_exclude_set() {
        let excludes = ExcludeSet::new(&["BearImages/", ".Ulysses*", "*.Ulysses_Public_Filter"])
            .unwrap();
        assert!(excludes.is_excluded("BearImages", true));
        assert!(!excludes.is_excluded("BearImages", false));
        assert!(excludes.is_excluded(".Ulysses-Group.plist", false));
        assert!(excludes.is_excluded("Work.Ulysses_Public_Filter", false));
        assert!(!excludes.is_excluded("Notes.md", false));
    }

    #[test]
    fn test_mirror_copies_and_deletes() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");

        write_with_mtime(&src.join("work/a.md"), "a", at(1_000)).unwrap();
        write_with_mtime(&dst.join("gone.md"), "old", at(500)).unwrap();
        write_with_mtime(&dst.join("BearImages/img.png"), "png", at(500)).unwrap();

        let options = MirrorOptions {
            delete_missing: true,
            excludes: ExcludeSet::new(&["BearImages/"]).unwrap(),
        };
        let stats = mirror_dir(&src, &dst, &options).unwrap();

        assert_eq!(stats, MirrorStats { copied: 1, deleted: 1 });
        assert_eq!(mtime(&dst.join("work/a.md")).unwrap(), at(1_000));
        assert!(!dst.join("gone.md").exists());
        assert!(dst.join("BearImages/img.png").exists());

        // Unchanged source: nothing to do
        let again = mirror_dir(&src, &dst, &options).unwrap();
        assert_eq!(again, MirrorStats::default());
    }

    #[test]
    fn test_mirror_without_delete_keeps_extra_files() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        write_with_mtime(&src.join("a.md"), "a", at(1_000)).unwrap();
        write_with_mtime(&dst.join("mine.md"), "keep", at(1_000)).unwrap();

        mirror_dir(&src, &dst, &MirrorOptions::default()).unwrap();

        assert!(dst.join("a.md").exists());
        assert!(dst.join("mine.md").exists());
    }

    #[test]
    fn test_backups_never_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("Note.md");
        let backup = temp_dir.path().join("backup");
        fs::write(&src, "v1").unwrap();

        let first = backup_file(&src, &backup).unwrap();
        fs::write(&src, "v2").unwrap();
        let second = backup_file(&src, &backup).unwrap();

        assert_eq!(first, backup.join("Note.md"));
        assert_eq!(second, backup.join("Note - 02.md"));
        assert_eq!(fs::read_to_string(first).unwrap(), "v1");
        assert_eq!(fs::read_to_string(second).unwrap(), "v2");
    }

    #[test]
    fn test_backup_dir_copies_bundle() {
        let temp_dir = TempDir::new().unwrap();
        let bundle = temp_dir.path().join("Trip.textbundle");
        fs::create_dir_all(bundle.join("assets")).unwrap();
        fs::write(bundle.join("text.md"), "Trip").unwrap();
        fs::write(bundle.join("assets/pic.jpg"), "jpg").unwrap();
        let backup = temp_dir.path().join("backup");

        let first = backup_dir(&bundle, &backup).unwrap();
        let second = backup_dir(&bundle, &backup).unwrap();

        assert_eq!(first, backup.join("Trip.textbundle"));
        assert_eq!(second, backup.join("Trip - 02.textbundle"));
        assert!(second.join("assets/pic.jpg").exists());
    }
}
