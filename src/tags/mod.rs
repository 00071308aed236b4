//! Inline tag parsing and folder placement.
//!
//! Bear tags live inside note text in two forms:
//!
//! - Unspaced: `#work/projects` (ends at whitespace)
//! - Spaced: `#reading list#` (closed by a second `#`)
//!
//! A tag must start the text or follow whitespace. The first tag in a note
//! decides its export folder (or every tag, in multi-folder mode). Tags
//! starting with `.` are private categories and map to `_`-prefixed folders
//! so that sync clients do not treat them as hidden files.
//!
//! See [`visibility`] for hiding tag lines from Markdown renderers and
//! [`finder`] for file-system tag metadata.

pub mod finder;
pub mod visibility;

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

pub use finder::{FileTags, parse_mdls_tags, read_file_tags};
pub use visibility::{TagVisibility, hide_tags, restore_tags};

/// Tag given to external notes found at the root of the export folder.
pub const INBOX_TAG: &str = "#.inbox";

static UNSPACED_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([.\w/\-]+)").expect("valid regex"));

/// What an unspaced tag must NOT be followed by: the rest of a spaced tag.
static SPACED_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[/ \w]+\w#").expect("valid regex"));

static SPACED_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([^ \d][.\w/ ]+?)#(?:[ \n]|$)").expect("valid regex"));

/// Which grammar produced a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Unspaced,
    Spaced,
}

/// A tag found in note text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch {
    /// Tag name without the surrounding `#` markers.
    pub name: String,
    /// Byte offset of the leading `#`.
    pub offset: usize,
    pub kind: TagKind,
}

/// Folder placement and filtering rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRules {
    pub make_tag_folders: bool,
    pub multi_tag_folders: bool,
    /// Allow-list of tag prefixes (case-insensitive); empty allows all.
    pub only_export: Vec<String>,
    /// Block-list of tag prefixes (case-insensitive).
    pub no_export: Vec<String>,
}

/// Why a note is left out of the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A tag matched the block-list.
    Excluded { tag: String },
    /// No tag matched the allow-list.
    NotIncluded,
}

/// Result of resolving a note's export folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Folders relative to the export root; an empty path is the root itself.
    Folders(Vec<PathBuf>),
    Skip(SkipReason),
}

/// Offsets where a tag may begin: a `#` at the start or after whitespace.
fn tag_starts(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.char_indices().filter_map(move |(i, c)| {
        if c != '#' {
            return None;
        }
        let preceded_ok = text[..i].chars().next_back().is_none_or(char::is_whitespace);
        preceded_ok.then_some(i)
    })
}

/// Try the unspaced grammar at `pos`.
///
/// The token is shortened from the end until what follows it no longer
/// looks like the remainder of a spaced tag, so `#reading list#` is never
/// read as the unspaced tag `reading`.
fn unspaced_at(text: &str, pos: usize) -> Option<String> {
    let caps = UNSPACED_TOKEN.captures(&text[pos..])?;
    let token = caps.get(1)?.as_str();
    let token_start = pos + 1;

    let mut ends: Vec<usize> = token.char_indices().map(|(i, c)| i + c.len_utf8()).collect();
    ends.reverse();

    for len in ends {
        let rest = &text[token_start + len..];
        if let Some(after_sep) = rest.strip_prefix([' ', '\n']) {
            if !SPACED_CONTINUATION.is_match(after_sep) {
                return Some(token[..len].to_string());
            }
        }
        if !SPACED_CONTINUATION.is_match(rest) {
            return Some(token[..len].to_string());
        }
    }
    None
}

/// Try the spaced grammar at `pos`, returning the name and match end.
fn spaced_at(text: &str, pos: usize) -> Option<(String, usize)> {
    let caps = SPACED_TAG.captures(&text[pos..])?;
    let whole = caps.get(0)?;
    Some((caps.get(1)?.as_str().to_string(), pos + whole.end()))
}

/// The first tag in the text, by position.
///
/// When both grammars match at the same `#`, the unspaced reading wins.
#[must_use]
pub fn extract_tag(text: &str) -> Option<TagMatch> {
    tag_starts(text).find_map(|pos| {
        if let Some(name) = unspaced_at(text, pos) {
            return Some(TagMatch {
                name,
                offset: pos,
                kind: TagKind::Unspaced,
            });
        }
        spaced_at(text, pos).map(|(name, _)| TagMatch {
            name,
            offset: pos,
            kind: TagKind::Spaced,
        })
    })
}

/// Every tag in the text: all unspaced tags, then all spaced tags.
#[must_use]
pub fn extract_all_tags(text: &str) -> Vec<TagMatch> {
    let mut tags: Vec<TagMatch> = tag_starts(text)
        .filter_map(|pos| {
            unspaced_at(text, pos).map(|name| TagMatch {
                name,
                offset: pos,
                kind: TagKind::Unspaced,
            })
        })
        .collect();

    let mut resume = 0;
    for pos in tag_starts(text) {
        if pos < resume {
            continue;
        }
        if let Some((name, end)) = spaced_at(text, pos) {
            tags.push(TagMatch {
                name,
                offset: pos,
                kind: TagKind::Spaced,
            });
            resume = end;
        }
    }

    tags
}

/// Folder for a tag: `.private/x` becomes `_private/x`.
///
/// Empty, `.` and `..` segments are dropped so a tag can never point
/// outside the export tree.
#[must_use]
pub fn folder_for_tag(tag: &str) -> PathBuf {
    let name = tag.strip_prefix('.').map_or_else(|| tag.to_string(), |rest| format!("_{rest}"));

    name.split('/')
        .map(str::trim)
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .collect()
}

fn prefix_matches(tag: &str, prefix: &str) -> bool {
    tag.to_lowercase().starts_with(&prefix.to_lowercase())
}

/// Decide where a note is exported, or whether it is skipped.
///
/// Notes without tags go to the root in both single- and multi-folder mode.
#[must_use]
pub fn resolve_placement(text: &str, rules: &TagRules) -> Placement {
    if !rules.make_tag_folders {
        return Placement::Folders(vec![PathBuf::new()]);
    }

    let tags: Vec<String> = if rules.multi_tag_folders {
        extract_all_tags(text).into_iter().map(|t| t.name).collect()
    } else {
        extract_tag(text).into_iter().map(|t| t.name).collect()
    };

    if tags.is_empty() {
        return Placement::Folders(vec![PathBuf::new()]);
    }

    let mut folders: Vec<PathBuf> = Vec::new();
    for tag in tags {
        if tag == "/" {
            continue;
        }
        if !rules.only_export.is_empty()
            && !rules.only_export.iter().any(|allowed| prefix_matches(&tag, allowed))
        {
            continue;
        }
        if rules.no_export.iter().any(|blocked| prefix_matches(&tag, blocked)) {
            return Placement::Skip(SkipReason::Excluded { tag });
        }

        let folder = folder_for_tag(&tag);
        if !folders.contains(&folder) {
            folders.push(folder);
        }
    }

    if folders.is_empty() {
        Placement::Skip(SkipReason::NotIncluded)
    } else {
        Placement::Folders(folders)
    }
}

/// Write a tag name in the grammar that reads it back unchanged.
#[must_use]
pub fn format_tag(name: &str) -> String {
    if name.contains(' ') {
        format!("#{name}#")
    } else {
        format!("#{name}")
    }
}

/// Tag for a new external note, derived from its folder.
///
/// `relative_file` is the file path relative to the export root. A
/// `.textbundle` package directory is not part of the tag; `_x` folders
/// map back to private `.x` tags and root-level files get [`INBOX_TAG`].
#[must_use]
pub fn tag_from_path(relative_file: &Path) -> String {
    let folders: Vec<String> = relative_file
        .parent()
        .map(|dir| {
            dir.components()
                .filter_map(|c| match c {
                    Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
                    _ => None,
                })
                .filter(|seg| !seg.ends_with(".textbundle"))
                .collect()
        })
        .unwrap_or_default();

    let sub_path = folders.join("/");
    let sub_path = sub_path.trim();
    if sub_path.is_empty() {
        return INBOX_TAG.to_string();
    }

    match sub_path.strip_prefix('_') {
        Some(private) => format_tag(&format!(".{}", private.trim())),
        None => format_tag(sub_path),
    }
}

/// Append a line of tags to a note body.
#[must_use]
pub fn append_tags(text: &str, tags: &[String]) -> String {
    let body = text.trim();
    if tags.is_empty() {
        return format!("{body}\n");
    }
    format!("{body}\n\n{}\n", tags.join(" "))
}
