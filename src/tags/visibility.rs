//! Hiding tag lines from Markdown renderers.
//!
//! A line starting with `#tag` renders as a heading in most Markdown
//! editors. On export such lines are wrapped in an HTML comment or
//! prefixed with `. `; on import the same form is undone. Leading
//! indentation is kept in place so the two transforms are exact inverses.

use std::sync::LazyLock;

use regex::Regex;

/// How tag lines are disguised in exported files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagVisibility {
    /// `<!-- #tag -->`
    #[default]
    CommentBlock,
    /// `. #tag`
    DotEscape,
}

static HIDE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n([ \t]*)(#[\w.].+)").expect("valid regex"));
static HIDE_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n([ \t]*)(#[\w.]+)").expect("valid regex"));
static RESTORE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n([ \t]*)<!--[ \t]*(#[\w.].+?) -->").expect("valid regex"));
static RESTORE_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n([ \t]*)\.[ \t]*(#[\w.]+)").expect("valid regex"));

/// Disguise tag lines. The first line (the title) is never touched.
#[must_use]
pub fn hide_tags(text: &str, mode: TagVisibility) -> String {
    match mode {
        TagVisibility::CommentBlock => HIDE_COMMENT.replace_all(text, "\n${1}<!-- ${2} -->"),
        TagVisibility::DotEscape => HIDE_DOT.replace_all(text, "\n${1}. ${2}"),
    }
    .into_owned()
}

/// Undo the disguise applied by [`hide_tags`] in the same mode.
///
/// Lines in the other form are left alone, so a user's own `. #tag` line
/// survives a comment-mode round trip.
#[must_use]
pub fn restore_tags(text: &str, mode: TagVisibility) -> String {
    match mode {
        TagVisibility::CommentBlock => RESTORE_COMMENT.replace_all(text, "\n${1}${2}"),
        TagVisibility::DotEscape => RESTORE_DOT.replace_all(text, "\n${1}${2}"),
    }
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "Groceries\nBuy milk\n#.inbox\n  #work/errands #home\n# Heading\n";

    #[test]
    fn test_comment_block() {
        let hidden = hide_tags(BODY, TagVisibility::CommentBlock);
        assert!(hidden.contains("\n<!-- #.inbox -->\n"));
        assert!(hidden.contains("\n  <!-- #work/errands #home -->\n"));
        assert!(hidden.contains("\n# Heading\n"));
    }

    #[test]
    fn test_dot_escape() {
        let hidden = hide_tags(BODY, TagVisibility::DotEscape);
        assert!(hidden.contains("\n. #.inbox\n"));
        assert!(hidden.contains("\n  . #work/errands #home\n"));
    }

    #[test]
    fn test_round_trip_both_modes() {
        for mode in [TagVisibility::CommentBlock, TagVisibility::DotEscape] {
            assert_eq!(restore_tags(&hide_tags(BODY, mode), mode), BODY);
        }

        let dotted = "Title\n. #tag line written by user\nmore";
        let mode = TagVisibility::CommentBlock;
        assert_eq!(restore_tags(&hide_tags(dotted, mode), mode), dotted);
    }

    #[test]
    fn test_restore_tolerates_hand_edits() {
        assert_eq!(restore_tags("x\n<!--#tag -->", TagVisibility::CommentBlock), "x\n#tag");
        assert_eq!(restore_tags("x\n.#tag", TagVisibility::DotEscape), "x\n#tag");
    }

    #[test]
    fn test_restore_ignores_other_form() {
        assert_eq!(restore_tags("x\n<!-- #tag -->", TagVisibility::DotEscape), "x\n<!-- #tag -->");
    }

    #[test]
    fn test_title_line_untouched() {
        assert_eq!(hide_tags("#tag only", TagVisibility::CommentBlock), "#tag only");
    }
}
