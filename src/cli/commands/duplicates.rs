//! Duplicates command implementation.

use crate::config::load_config;
use crate::error::Result;
use crate::storage::{DuplicateTitle, NoteStore, duplicate_surplus};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct DuplicatesOutput {
    duplicates: Vec<DuplicateTitle>,
    /// Notes beyond the first of each title.
    surplus: usize,
}

/// Execute the duplicates command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the database cannot
/// be queried.
pub fn execute(config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path.map(PathBuf::as_path))?;
    let store = NoteStore::open(&config.database_path)?;
    let duplicates = store.duplicate_titles()?;
    let surplus = duplicate_surplus(&duplicates);

    if json {
        let output = DuplicatesOutput {
            duplicates,
            surplus,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if duplicates.is_empty() {
        println!("No duplicate titles.");
        return Ok(());
    }

    for dup in &duplicates {
        println!("{:>4}  {}", dup.count, dup.title);
    }
    println!();
    println!("{surplus} duplicate notes");
    Ok(())
}
