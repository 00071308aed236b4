//! Check command implementation: list externally edited files.

use crate::config::load_config;
use crate::error::Result;
use crate::sync::peek_changed;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct CheckOutput {
    export_path: PathBuf,
    /// False before the first export.
    has_baseline: bool,
    changed: Vec<PathBuf>,
}

/// Execute the check command. The sync markers are left untouched.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the export folder
/// cannot be walked.
pub fn execute(config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path.map(PathBuf::as_path))?;
    let changes = peek_changed(&config.export_path)?;

    let output = CheckOutput {
        export_path: config.export_path.clone(),
        has_baseline: changes.is_some(),
        changed: changes.map(|c| c.files).unwrap_or_default(),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if !output.has_baseline {
        println!("No previous export in {}", output.export_path.display());
    } else if output.changed.is_empty() {
        println!("No changed files.");
    } else {
        for path in &output.changed {
            let shown = path.strip_prefix(&output.export_path).unwrap_or(path);
            println!("{}", shown.display());
        }
    }
    Ok(())
}
