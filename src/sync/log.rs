//! Human-readable action log.
//!
//! One line per export summary, backup, conflict and import is appended to
//! `<backup>/bear_export_sync_log.txt`, so a user can see what a background
//! run did to their notes.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::warn;

use crate::config::SyncConfig;

pub const ACTION_LOG_FILE: &str = "bear_export_sync_log.txt";

#[derive(Debug, Clone)]
pub struct ActionLog {
    path: Option<PathBuf>,
    export_root: String,
}

impl ActionLog {
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            path: config
                .action_log
                .then(|| config.backup_path.join(ACTION_LOG_FILE)),
            export_root: format!("{}/", config.export_path.display()),
        }
    }

    /// A log that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            path: None,
            export_root: String::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a timestamped line. Failures are logged, not returned.
    pub fn record(&self, message: &str) {
        let Some(path) = &self.path else {
            return;
        };

        let message = if self.export_root.is_empty() {
            message.to_string()
        } else {
            message.replace(&self.export_root, "")
        };
        let line = format!("{}: {message}\n", Local::now().format("%Y-%m-%d at %H:%M:%S"));

        let result = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| OpenOptions::new().create(true).append(true).open(path))
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Could not write action log");
        }
    }
}
