//! Image reference rewriting.
//!
//! Bear stores images as `[image:<dir>/<file>]`. Exported files use plain
//! Markdown image links instead, either into a package's `assets/` folder
//! or into a shared image folder at the export root.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::ImageMode;

static DB_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[image:(.+?)\]").expect("valid regex"));
static DB_IMAGE_PARTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[image:(.+?)/(.+?)\]").expect("valid regex"));
static BUNDLE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[(.*?)\]\(assets/(.+?)_(.+?)( ".+?")?\) ?"#).expect("valid regex")
});
static ASSET_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[.*?\]\(assets/(.+?_).+?\)").expect("valid regex"));
/// Asset names Bear generates: `<uuid>-<n>-<hex16>_`.
static GENERATED_ASSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-F]{8}-([0-9A-F]{4}-){3}[0-9A-F]{12}-[0-9A-F]{3,5}-[0-9A-F]{16}_")
        .expect("valid regex")
});

/// Image references in database form, as `<dir>/<file>`.
#[must_use]
pub fn image_refs(text: &str) -> Vec<String> {
    DB_IMAGE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[must_use]
pub fn has_images(text: &str) -> bool {
    DB_IMAGE.is_match(text)
}

/// File name of an image inside a package's `assets/` folder.
#[must_use]
pub fn bundle_asset_name(reference: &str) -> String {
    reference.replace('/', "_")
}

/// `[image:d/f]` → `![](assets/d_f)`
#[must_use]
pub fn to_bundle_refs(text: &str) -> String {
    DB_IMAGE_PARTS
        .replace_all(text, "![](assets/${1}_${2})")
        .into_owned()
}

/// `[image:d/f]` → `![](../../<assets_dir>/d/f)` for a file `depth` folders deep.
#[must_use]
pub fn to_shared_refs(text: &str, depth: usize, assets_dir: &str) -> String {
    let parent = "../".repeat(depth);
    let replacement = format!("![]({parent}{}/${{1}})", assets_dir.replace('$', "$$"));
    DB_IMAGE.replace_all(text, replacement.as_str()).into_owned()
}

/// Package links back to database form; link text is kept after the reference.
#[must_use]
pub fn restore_bundle_refs(text: &str) -> String {
    BUNDLE_IMAGE
        .replace_all(text, "[image:${2}/${3}]${4} ${1}")
        .into_owned()
}

/// Shared-folder links back to database form.
#[must_use]
pub fn restore_shared_refs(text: &str, assets_dir: &str) -> String {
    let pattern = format!(r"!\[\]\((\.\./)*{}/(.+?)\)", regex::escape(assets_dir));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, "[image:${2}]").into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Undo the export-side rewrite for the configured mode.
#[must_use]
pub fn restore_image_refs(text: &str, mode: ImageMode, assets_dir: &str) -> String {
    match mode {
        ImageMode::Plain => text.to_string(),
        ImageMode::Bundle => restore_bundle_refs(text),
        ImageMode::SharedRepository => restore_shared_refs(text, assets_dir),
    }
}

/// Whether the text links package images Bear did not generate,
/// i.e. images added by an external editor.
#[must_use]
pub fn has_added_images(text: &str) -> bool {
    ASSET_LINK
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .any(|name| !GENERATED_ASSET.is_match(name.as_str()))
}

/// Asset file names linked from `assets/`.
#[must_use]
pub fn linked_assets(text: &str) -> Vec<String> {
    static LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[.*?\]\(assets/(.+?)\)").expect("valid regex"));
    LINK.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}
