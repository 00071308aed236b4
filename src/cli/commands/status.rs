//! Status command implementation.

use crate::config::load_config;
use crate::error::Result;
use crate::sync::{get_sync_status, print_status};
use std::path::PathBuf;

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the export folder
/// cannot be walked.
pub fn execute(config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path.map(PathBuf::as_path))?;
    let status = get_sync_status(&config)?;

    if json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}
