//! Commands sent to the notes app.
//!
//! Bear is never written to directly. Creates and replaces go through its
//! `x-callback-url` scheme; packages with images are opened with the app.
//! A [`CommandSink`] abstracts the delivery so passes can run against a
//! recording fake.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SyncConfig;

static HEADING_HASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+ ").expect("valid regex"));

/// One instruction for the notes app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum NoteCommand {
    /// Create a new note from text.
    Create { text: String },
    /// Replace the whole text of an existing note.
    Replace { id: String, text: String },
    /// Import a `.textbundle` package by opening it with the app.
    OpenPackage { path: PathBuf },
}

impl NoteCommand {
    /// The URL for text commands; `None` for packages.
    #[must_use]
    pub fn url(&self, scheme: &str) -> Option<String> {
        match self {
            Self::Create { text } => Some(format!(
                "{scheme}://x-callback-url/create?show_window=no&text={}",
                urlencoding::encode(text)
            )),
            Self::Replace { id, text } => Some(format!(
                "{scheme}://x-callback-url/add-text?show_window=no&mode=replace&id={}&text={}",
                urlencoding::encode(id),
                urlencoding::encode(text)
            )),
            Self::OpenPackage { .. } => None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Replace { .. } => "replace",
            Self::OpenPackage { .. } => "open_package",
        }
    }
}

/// Link that opens a note in the app.
#[must_use]
pub fn open_note_url(scheme: &str, id: &str) -> String {
    format!(
        "{scheme}://x-callback-url/open-note?id={}",
        urlencoding::encode(id)
    )
}

/// Text for a create or replace command.
///
/// `banner` becomes the second line. With `original_title`, a first line
/// equal to that title (ignoring heading hashes) is dropped, since Bear
/// keeps the title of a replaced note.
#[must_use]
pub fn compose_payload(text: &str, banner: Option<&str>, original_title: Option<&str>) -> String {
    let mut lines: Vec<&str> = text.lines().collect();

    if let Some(banner) = banner {
        let at = lines.len().min(1);
        lines.insert(at, banner);
    }

    if let (Some(title), Some(first)) = (original_title, lines.first()) {
        if HEADING_HASHES.replace(first, "") == title {
            lines.remove(0);
        }
    }

    lines.join("\n")
}

/// Something that can deliver commands to the notes app.
pub trait CommandSink {
    /// Deliver a command. Returns whether it was acknowledged.
    fn dispatch(&mut self, command: &NoteCommand) -> bool;
}

/// Delivers commands through the operating system's URL opener.
#[derive(Debug, Clone)]
pub struct UrlOpener {
    scheme: String,
    app_path: PathBuf,
    delay: Duration,
}

impl UrlOpener {
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            scheme: config.url_scheme.clone(),
            app_path: config.app_path.clone(),
            delay: config.command_delay(),
        }
    }

    #[cfg(target_os = "macos")]
    fn open_package_command(&self, path: &Path) -> Command {
        let mut cmd = Command::new("open");
        cmd.arg("-a").arg(&self.app_path).arg(path);
        cmd
    }

    #[cfg(not(target_os = "macos"))]
    fn open_package_command(&self, path: &Path) -> Command {
        debug!(app = %self.app_path.display(), "Opening package with default handler");
        let mut cmd = Command::new("xdg-open");
        cmd.arg(path);
        cmd
    }

    fn open_url_command(url: &str) -> Command {
        let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
        let mut cmd = Command::new(opener);
        cmd.arg(url);
        cmd
    }
}

impl CommandSink for UrlOpener {
    fn dispatch(&mut self, command: &NoteCommand) -> bool {
        let mut process = match command {
            NoteCommand::OpenPackage { path } => self.open_package_command(path),
            other => match other.url(&self.scheme) {
                Some(url) => Self::open_url_command(&url),
                None => return false,
            },
        };

        let acknowledged = match process.status() {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!(command = command.kind(), %status, "Opener exited with failure");
                false
            }
            Err(e) => {
                warn!(command = command.kind(), error = %e, "Could not run opener");
                false
            }
        };

        debug!(command = command.kind(), acknowledged, "Dispatched command");
        // Give the app time to process before the next command
        thread::sleep(self.delay);
        acknowledged
    }
}

/// Keeps commands instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub commands: Vec<NoteCommand>,
    reject: bool,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records but refuses every command.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            commands: Vec::new(),
            reject: true,
        }
    }
}

impl CommandSink for RecordingSink {
    fn dispatch(&mut self, command: &NoteCommand) -> bool {
        self.commands.push(command.clone());
        !self.reject
    }
}
