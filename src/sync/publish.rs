//! Publishing the staging tree.
//!
//! The freshly exported staging folder is mirrored one way into every
//! destination. Only files whose size or mtime changed are copied, so file
//! sync clients upload just the notes that actually changed.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{Destination, ImageMode, STAGING_MARKER, SyncConfig};
use crate::sync::file::{
    ExcludeSet, MIRROR_EXCLUDES, MirrorOptions, MirrorStats, ensure_staging_path, mirror_dir,
};
use crate::sync::types::SyncResult;

/// Changes made to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedDestination {
    pub path: PathBuf,
    #[serde(flatten)]
    pub stats: MirrorStats,
}

/// Patterns a delete-aware publish leaves alone in a destination.
#[must_use]
pub fn publish_excludes(assets_dir_name: &str) -> Vec<String> {
    let mut patterns = vec![format!("{assets_dir_name}/")];
    patterns.extend(MIRROR_EXCLUDES.iter().map(ToString::to_string));
    patterns
}

/// Mirror `staging` into each destination.
///
/// # Errors
///
/// Returns `UnsafePath` if `staging` lacks the staging marker, or an IO
/// error from the copy.
pub fn publish(
    staging: &Path,
    destinations: &[Destination],
    assets_dir_name: &str,
) -> SyncResult<Vec<PublishedDestination>> {
    ensure_staging_path(staging, STAGING_MARKER)?;
    let excludes = ExcludeSet::new(&publish_excludes(assets_dir_name))?;

    let mut published = Vec::with_capacity(destinations.len());
    for dest in destinations {
        debug!(
            dest = %dest.path.display(),
            delete_missing = dest.delete_missing,
            "Publishing staging folder"
        );
        let options = MirrorOptions {
            delete_missing: dest.delete_missing,
            excludes: excludes.clone(),
        };
        let stats = mirror_dir(staging, &dest.path, &options)?;
        published.push(PublishedDestination {
            path: dest.path.clone(),
            stats,
        });
    }
    Ok(published)
}

/// Mirror Bear's image folder into the shared image folder.
///
/// Only used in shared-repository mode; returns `None` otherwise, or when
/// the image folder does not exist.
///
/// # Errors
///
/// Returns an error if the copy fails.
pub fn mirror_images(config: &SyncConfig) -> SyncResult<Option<MirrorStats>> {
    if config.image_mode != ImageMode::SharedRepository {
        return Ok(None);
    }
    if !config.image_source_path.is_dir() {
        warn!(
            path = %config.image_source_path.display(),
            "Image folder not found, skipping image mirror"
        );
        return Ok(None);
    }

    let options = MirrorOptions {
        delete_missing: true,
        excludes: ExcludeSet::default(),
    };
    mirror_dir(&config.image_source_path, &config.assets_path(), &options).map(Some)
}
