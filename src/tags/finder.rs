//! Finder tags attached to files.
//!
//! Files created in a synced folder may carry Finder tags; these are turned
//! into note tags when the file is imported as a new note.

use std::path::Path;
#[cfg(target_os = "macos")]
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
#[cfg(target_os = "macos")]
use tracing::warn;

use super::format_tag;

/// Colour label suffix Finder appends to a tag name (`work\n6`).
static COLOR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\\n|\n)\d{1,2}$").expect("valid regex"));

/// Outcome of reading a file's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTags {
    Found(Vec<String>),
    NoneFound,
    /// The metadata tool ran but failed, or its output was unusable.
    Failed(String),
    /// No file tag support on this platform.
    Unsupported,
}

impl FileTags {
    /// Tag names, formatted as note tags. Empty unless `Found`.
    #[must_use]
    pub fn into_note_tags(self) -> Vec<String> {
        match self {
            Self::Found(names) => names.iter().map(|n| format_tag(n.trim())).collect(),
            Self::NoneFound | Self::Failed(_) | Self::Unsupported => Vec::new(),
        }
    }
}

/// Parse `mdls -raw -name kMDItemUserTags` output.
///
/// The tool prints `(null)` when a file has no tags, otherwise a
/// parenthesised list with one (possibly quoted) name per line.
#[must_use]
pub fn parse_mdls_tags(output: &str) -> FileTags {
    let output = output.trim();
    if output.is_empty() || output == "(null)" {
        return FileTags::NoneFound;
    }

    let Some(inner) = output
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    else {
        return FileTags::Failed(format!("unexpected mdls output: {output}"));
    };

    let names: Vec<String> = inner
        .split(",\n")
        .map(|item| {
            let item = item.trim().trim_matches('"');
            COLOR_SUFFIX.replace(item, "").trim().to_string()
        })
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        FileTags::NoneFound
    } else {
        FileTags::Found(names)
    }
}

/// Read the Finder tags of `path`.
#[cfg(target_os = "macos")]
pub fn read_file_tags(path: &Path) -> FileTags {
    let output = match Command::new("mdls")
        .args(["-raw", "-name", "kMDItemUserTags"])
        .arg(path)
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not run mdls");
            return FileTags::Failed(e.to_string());
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(path = %path.display(), %stderr, "mdls failed");
        return FileTags::Failed(stderr);
    }

    let tags = parse_mdls_tags(&String::from_utf8_lossy(&output.stdout));
    match &tags {
        FileTags::Failed(reason) => warn!(path = %path.display(), %reason, "Unreadable file tags"),
        other => debug!(path = %path.display(), tags = ?other, "Read file tags"),
    }
    tags
}

/// Read the Finder tags of `path`.
#[cfg(not(target_os = "macos"))]
pub fn read_file_tags(path: &Path) -> FileTags {
    debug!(path = %path.display(), "File tags unsupported on this platform");
    FileTags::Unsupported
}
