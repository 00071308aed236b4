//! Sync command implementation: one full bidirectional pass.

use crate::config::load_config;
use crate::error::Result;
use crate::sync::{SyncDriver, SyncReport, UrlOpener};
use colored::Colorize;
use std::path::PathBuf;

/// Execute the sync command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the database cannot be
/// opened, or export and publish fail.
pub fn execute(config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path.map(PathBuf::as_path))?;
    let mut sink = UrlOpener::new(&config);
    let report = SyncDriver::new(&config, &mut sink).run()?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    let reconcile = &report.reconcile;
    if report.rounds > 0 {
        println!("{}", "Imported to Bear:".blue().bold());
        println!("  Updated:   {}", reconcile.updated);
        println!("  New:       {}", reconcile.imported);
        println!("  Packages:  {}", reconcile.packages);
        if reconcile.conflicts > 0 {
            println!("  {} {}", "Conflicts:".yellow(), reconcile.conflicts);
        }
        if reconcile.errors > 0 {
            println!(
                "  {} {} (see warnings above)",
                "Skipped:".red(),
                reconcile.errors
            );
        }
        println!();
    }

    if report.export_withheld {
        println!(
            "{}",
            format!(
                "{} edited files still pending; export skipped so they are not overwritten.",
                reconcile.failed.len()
            )
            .yellow()
        );
        if report.gave_up {
            println!("{}", "Files were still changing after the last round.".dimmed());
        }
        println!("{}", "Run 'bearsync sync' again to retry.".dimmed());
        return;
    }

    match &report.export {
        Some(stats) => {
            println!("{}", "Exported:".blue().bold());
            println!("  Notes:     {}", stats.notes);
            println!("  Files:     {}", stats.files_written);
            if stats.skipped > 0 {
                println!("  Skipped:   {}", stats.skipped);
            }
            if stats.unreadable > 0 {
                println!("  {} {}", "Unreadable:".yellow(), stats.unreadable);
            }
            for dest in &report.published {
                println!(
                    "  {} ({} copied, {} deleted)",
                    dest.path.display(),
                    dest.stats.copied,
                    dest.stats.deleted
                );
            }
        }
        None if report.rounds == 0 => println!("{}", "Nothing to sync.".green()),
        None => println!("{}", "No Bear changes to export.".green()),
    }
}
