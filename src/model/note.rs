//! Note model for bear-sync.
//!
//! Notes are owned by Bear. The sync engine reads them from the database
//! snapshot and never writes them back directly.

use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Seconds between the Unix epoch and the database epoch (2001-01-01 UTC).
///
/// Bear stores timestamps as Core Data reference dates: 31 Julian years
/// plus six hours after 1970-01-01.
pub const DB_EPOCH_OFFSET_SECS: f64 = 365.25 * 24.0 * 3600.0 * 31.0 + 6.0 * 3600.0;

/// Maximum number of title characters kept in a file name.
const MAX_TITLE_CHARS: usize = 56;

static UNSAFE_TITLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/\\*?$@!^&|~:]").expect("valid regex"));

/// A note as read from the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Bear's stable per-note identifier (`ZUNIQUEIDENTIFIER`)
    pub id: String,

    /// Note title as stored by Bear
    pub title: String,

    /// Full note text, including the title line
    pub body: String,

    /// Creation timestamp (database epoch seconds)
    pub created_at: f64,

    /// Last modification timestamp (database epoch seconds)
    pub modified_at: f64,

    /// Whether the note sits in Bear's trash
    pub trashed: bool,
}

impl Note {
    /// Modification time in Unix seconds.
    #[must_use]
    pub fn modified_unix(&self) -> f64 {
        db_to_unix(self.modified_at)
    }

    /// Modification time as a `SystemTime`, for setting file mtimes.
    ///
    /// Snapshot rows with an out-of-range timestamp are rejected on read, so
    /// the epoch fallback only applies to hand-built notes.
    #[must_use]
    pub fn modified_time(&self) -> SystemTime {
        unix_to_system_time(self.modified_unix()).unwrap_or(UNIX_EPOCH)
    }

    /// File-name-safe version of the title.
    #[must_use]
    pub fn file_stem(&self) -> String {
        clean_title(&self.title)
    }
}

/// Convert a database timestamp to Unix seconds.
#[must_use]
pub fn db_to_unix(db_seconds: f64) -> f64 {
    db_seconds + DB_EPOCH_OFFSET_SECS
}

/// Convert Unix seconds to a `SystemTime`.
///
/// Returns `None` for NaN, infinite or out-of-range values.
#[must_use]
pub fn unix_to_system_time(unix_seconds: f64) -> Option<SystemTime> {
    if unix_seconds >= 0.0 {
        let offset = Duration::try_from_secs_f64(unix_seconds).ok()?;
        UNIX_EPOCH.checked_add(offset)
    } else {
        let offset = Duration::try_from_secs_f64(-unix_seconds).ok()?;
        UNIX_EPOCH.checked_sub(offset)
    }
}

/// Convert a `SystemTime` to Unix seconds.
#[must_use]
pub fn system_time_to_unix(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Turn a note title into a file name stem.
///
/// Keeps the first 56 characters, replaces path and shell metacharacters
/// with `-`, drops a trailing `-` and falls back to `Untitled`.
#[must_use]
pub fn clean_title(title: &str) -> String {
    let truncated: String = title.chars().take(MAX_TITLE_CHARS).collect();
    let truncated = truncated.trim();
    let truncated = if truncated.is_empty() {
        "Untitled"
    } else {
        truncated
    };

    let replaced = UNSAFE_TITLE_CHARS.replace_all(truncated, "-");
    let replaced = replaced.strip_suffix('-').unwrap_or(&replaced);
    replaced.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_offset_is_2001() {
        // 2001-01-01T00:00:00Z
        assert!((DB_EPOCH_OFFSET_SECS - 978_307_200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_modified_conversion() {
        let note = Note {
            id: "abc".into(),
            title: "t".into(),
            body: "t".into(),
            created_at: 0.0,
            modified_at: 100.0,
            trashed: false,
        };
        assert!((note.modified_unix() - 978_307_300.0).abs() < 1e-6);
        let back = system_time_to_unix(note.modified_time());
        assert!((back - 978_307_300.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_unix_round_trip() {
        let t = unix_to_system_time(-10.5).unwrap();
        assert!((system_time_to_unix(t) + 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_unrepresentable_time_is_none() {
        assert!(unix_to_system_time(f64::INFINITY).is_none());
        assert!(unix_to_system_time(f64::NAN).is_none());
        assert!(unix_to_system_time(1e300).is_none());
        assert!(unix_to_system_time(-1e300).is_none());
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("Groceries"), "Groceries");
        assert_eq!(clean_title("   "), "Untitled");
        assert_eq!(clean_title("a/b: c?"), "a-b- c");
        assert_eq!(clean_title("Why!"), "Why");
    }

    #[test]
    fn test_clean_title_truncates_chars_not_bytes() {
        let long = "é".repeat(80);
        assert_eq!(clean_title(&long).chars().count(), 56);
    }
}
