//! Configuration management.
//!
//! All tunables live in one immutable [`SyncConfig`] value that is built once
//! at startup and handed by reference to every component.
//!
//! # Resolution
//!
//! 1. Explicit `--config` path
//! 2. `BEARSYNC_CONFIG` environment variable
//! 3. `~/.bearsync/config.json`
//!
//! A missing file yields the defaults; every field in the file is optional.

use crate::error::{Error, Result};
use crate::tags::{TagRules, TagVisibility};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Substring every staging path must contain before it may be wiped.
pub const STAGING_MARKER: &str = "BearExportTemp";

/// Default folder name of the shared image repository inside the export tree.
pub const DEFAULT_ASSETS_DIR: &str = "BearImages";

/// Location of Bear's data inside the user's home directory.
const BEAR_CONTAINER: &str =
    "Library/Group Containers/9K33E3U3T4.net.shinyfrog.bear/Application Data";

/// How images referenced by notes are exported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMode {
    /// Plain Markdown; image references are left as Bear wrote them.
    Plain,
    /// Self-contained `.textbundle` packages with copied images.
    Bundle,
    /// Plain Markdown linking into one shared image folder.
    #[default]
    SharedRepository,
}

/// One publish target for the staging tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub path: PathBuf,
    /// Delete files that no longer exist in the staging tree.
    #[serde(default)]
    pub delete_missing: bool,
}

/// Immutable sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Place notes in folders named after their first tag.
    pub make_tag_folders: bool,
    /// Copy notes into every tag folder instead of the first one only.
    pub multi_tag_folders: bool,
    /// Hide tag lines in `<!-- -->` comments (otherwise prefix them with `. `).
    pub hide_tags_in_comment_block: bool,
    /// If non-empty, only notes whose tag prefix-matches one of these are exported.
    pub only_export_tags: Vec<String>,
    /// Notes carrying a tag that prefix-matches one of these are never exported.
    pub no_export_tags: Vec<String>,

    pub image_mode: ImageMode,
    /// Bundle mode only: notes without images are written as plain `.md`.
    pub bundle_only_with_images: bool,
    pub assets_dir_name: String,

    /// Primary export folder; always published with `delete_missing`.
    pub export_path: PathBuf,
    pub extra_destinations: Vec<Destination>,
    pub staging_path: PathBuf,
    pub database_path: PathBuf,
    pub image_source_path: PathBuf,
    pub backup_path: PathBuf,

    /// URL scheme of the notes app's command interface.
    pub url_scheme: String,
    /// Application used to open imported packages.
    pub app_path: PathBuf,

    /// Wait before reading the first changed file of a round.
    pub download_settle_secs: u64,
    /// Wait after a reconciliation round before scanning again.
    pub reconcile_settle_secs: u64,
    /// Wait after every dispatched command.
    pub command_delay_ms: u64,
    /// Upper bound on reconcile/re-check rounds per pass.
    pub max_reconcile_rounds: u32,

    /// Append human-readable action lines to the log file in `backup_path`.
    pub action_log: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::for_home(&home)
    }
}

impl SyncConfig {
    /// Defaults rooted at the given home directory.
    #[must_use]
    pub fn for_home(home: &Path) -> Self {
        let bear = home.join(BEAR_CONTAINER);
        Self {
            make_tag_folders: true,
            multi_tag_folders: false,
            hide_tags_in_comment_block: true,
            only_export_tags: Vec::new(),
            no_export_tags: Vec::new(),
            image_mode: ImageMode::default(),
            bundle_only_with_images: true,
            assets_dir_name: DEFAULT_ASSETS_DIR.to_string(),
            export_path: home.join("BearNotes"),
            extra_destinations: Vec::new(),
            staging_path: home.join("Temp").join(STAGING_MARKER),
            database_path: bear.join("database.sqlite"),
            image_source_path: bear.join("Local Files").join("Note Images"),
            backup_path: home.join("BearSyncBackup"),
            url_scheme: "bear".to_string(),
            app_path: PathBuf::from("/Applications/Bear.app"),
            download_settle_secs: 5,
            reconcile_settle_secs: 3,
            command_delay_ms: 200,
            max_reconcile_rounds: 5,
            action_log: true,
        }
    }

    /// Every publish target, primary export folder first.
    #[must_use]
    pub fn destinations(&self) -> Vec<Destination> {
        let mut all = vec![Destination {
            path: self.export_path.clone(),
            delete_missing: true,
        }];
        all.extend(
            self.extra_destinations
                .iter()
                .filter(|d| d.path != self.export_path)
                .cloned(),
        );
        all
    }

    /// Shared image repository inside the primary export folder.
    #[must_use]
    pub fn assets_path(&self) -> PathBuf {
        self.export_path.join(&self.assets_dir_name)
    }

    /// Folder placement and filtering rules for the tag extractor.
    #[must_use]
    pub fn tag_rules(&self) -> TagRules {
        TagRules {
            make_tag_folders: self.make_tag_folders,
            multi_tag_folders: self.multi_tag_folders,
            only_export: self.only_export_tags.clone(),
            no_export: self.no_export_tags.clone(),
        }
    }

    /// How tag lines are hidden from Markdown renderers.
    #[must_use]
    pub const fn tag_visibility(&self) -> TagVisibility {
        if self.hide_tags_in_comment_block {
            TagVisibility::CommentBlock
        } else {
            TagVisibility::DotEscape
        }
    }

    #[must_use]
    pub const fn download_settle(&self) -> Duration {
        Duration::from_secs(self.download_settle_secs)
    }

    #[must_use]
    pub const fn reconcile_settle(&self) -> Duration {
        Duration::from_secs(self.reconcile_settle_secs)
    }

    #[must_use]
    pub const fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    /// Reject configurations that could destroy unrelated data.
    ///
    /// # Errors
    ///
    /// Returns `UnsafePath` if the staging path lacks the marker, and
    /// `Config` for overlapping paths or a zero round limit.
    pub fn validate(&self) -> Result<()> {
        if !self.staging_path.to_string_lossy().contains(STAGING_MARKER) {
            return Err(Error::UnsafePath {
                path: self.staging_path.clone(),
                marker: STAGING_MARKER.to_string(),
            });
        }

        for dest in self.destinations() {
            if dest.path.starts_with(&self.staging_path)
                || self.staging_path.starts_with(&dest.path)
            {
                return Err(Error::Config(format!(
                    "Staging path {} overlaps destination {}",
                    self.staging_path.display(),
                    dest.path.display()
                )));
            }
        }

        if self.max_reconcile_rounds == 0 {
            return Err(Error::Config(
                "max_reconcile_rounds must be at least 1".to_string(),
            ));
        }

        if self.assets_dir_name.trim().is_empty() || self.assets_dir_name.contains('/') {
            return Err(Error::Config(format!(
                "Invalid assets_dir_name: {:?}",
                self.assets_dir_name
            )));
        }

        Ok(())
    }
}

/// The user's home directory.
#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf())
}

/// Resolve the configuration file path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `BEARSYNC_CONFIG` environment variable
/// 3. `~/.bearsync/config.json`
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("BEARSYNC_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    home_dir().map(|home| home.join(".bearsync").join("config.json"))
}

/// Load and validate the configuration.
///
/// # Errors
///
/// Returns an error if an explicitly named file is missing, the file cannot
/// be parsed, or validation fails.
pub fn load_config(explicit_path: Option<&Path>) -> Result<SyncConfig> {
    let config = match resolve_config_path(explicit_path) {
        Some(path) if path.exists() => load_config_file(&path)?,
        Some(path) if explicit_path.is_some() => {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        _ => SyncConfig::default(),
    };

    config.validate()?;
    Ok(config)
}

/// Parse a configuration file without validating it.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<SyncConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}
