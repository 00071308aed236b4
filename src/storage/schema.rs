//! Notes database layout.
//!
//! Only the columns the sync engine consumes are listed here. Timestamps
//! are stored as REAL seconds since 2001-01-01 (see [`crate::model::note`]).

/// Table holding one row per note.
pub const NOTES_TABLE: &str = "ZSFNOTE";

/// Columns selected for a note snapshot, in `Note` field order.
pub const NOTE_COLUMNS: &str =
    "ZUNIQUEIDENTIFIER, ZTITLE, ZTEXT, ZCREATIONDATE, ZMODIFICATIONDATE, ZTRASHED";

/// All non-trashed notes, in a stable order so that export naming is stable.
pub const SELECT_ACTIVE_NOTES: &str = "SELECT ZUNIQUEIDENTIFIER, ZTITLE, ZTEXT, ZCREATIONDATE, ZMODIFICATIONDATE, ZTRASHED
     FROM ZSFNOTE
     WHERE ZTRASHED = 0
     ORDER BY ZCREATIONDATE, ZUNIQUEIDENTIFIER";

/// A single non-trashed note by identifier.
pub const SELECT_ACTIVE_NOTE_BY_ID: &str = "SELECT ZUNIQUEIDENTIFIER, ZTITLE, ZTEXT, ZCREATIONDATE, ZMODIFICATIONDATE, ZTRASHED
     FROM ZSFNOTE
     WHERE ZTRASHED = 0 AND ZUNIQUEIDENTIFIER = ?1";

/// Titles appearing more than once across all rows.
pub const SELECT_DUPLICATE_TITLES: &str = "SELECT ZTITLE, COUNT(*) AS n
     FROM ZSFNOTE
     WHERE ZTITLE IS NOT NULL
     GROUP BY ZTITLE
     HAVING n > 1
     ORDER BY n DESC, ZTITLE";

/// Minimal table definition matching the consumed columns.
///
/// Used to build fixture databases; Bear's real table has many more columns.
pub const NOTES_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS ZSFNOTE (
    Z_PK INTEGER PRIMARY KEY,
    ZUNIQUEIDENTIFIER VARCHAR,
    ZTITLE VARCHAR,
    ZTEXT VARCHAR,
    ZCREATIONDATE TIMESTAMP,
    ZMODIFICATIONDATE TIMESTAMP,
    ZTRASHED INTEGER DEFAULT 0
)";
