#![allow(deprecated)]

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin;
use bearsync::storage::schema::NOTES_TABLE_SQL;
use bearsync::sync::SyncMarkers;
use bearsync::sync::file::write_with_mtime;
use predicates::prelude::*;
use rusqlite::{Connection, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn bearsync_cmd() -> Command {
    let mut cmd = Command::new(cargo_bin("bearsync"));
    cmd.env_remove("BEARSYNC_CONFIG").env_remove("RUST_LOG");
    cmd
}

/// Write a config rooted in `home` and return its path.
fn write_config(home: &Path, staging: &str) -> PathBuf {
    let config = serde_json::json!({
        "database_path": home.join("database.sqlite"),
        "export_path": home.join("BearNotes"),
        "staging_path": home.join(staging),
        "backup_path": home.join("BearSyncBackup"),
        "image_source_path": home.join("images"),
        "download_settle_secs": 0,
        "reconcile_settle_secs": 0,
        "command_delay_ms": 0,
    });
    let path = home.join("config.json");
    fs::write(&path, config.to_string()).unwrap();
    path
}

fn create_db(home: &Path, notes: &[(&str, &str, &str)]) {
    let conn = Connection::open(home.join("database.sqlite")).unwrap();
    conn.execute_batch(NOTES_TABLE_SQL).unwrap();
    for (id, title, body) in notes {
        conn.execute(
            "INSERT INTO ZSFNOTE (ZUNIQUEIDENTIFIER, ZTITLE, ZTEXT, ZCREATIONDATE, ZMODIFICATIONDATE, ZTRASHED)
             VALUES (?1, ?2, ?3, 100.0, 100.0, 0)",
            params![id, title, body],
        )
        .unwrap();
    }
}

#[test]
fn test_version_json() {
    bearsync_cmd()
        .args(["version", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\""))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_duplicates_lists_repeated_titles() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "Temp/BearExportTemp");
    create_db(
        temp.path(),
        &[
            ("d1", "Draft", "Draft\none"),
            ("d2", "Draft", "Draft\ntwo"),
            ("x", "Other", "Other"),
        ],
    );

    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .args(["duplicates", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\":\"Draft\""))
        .stdout(predicate::str::contains("\"surplus\":1"));
}

#[test]
fn test_missing_database_exit_code() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "Temp/BearExportTemp");

    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .arg("duplicates")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Notes database not found"));
}

#[test]
fn test_unsafe_staging_path_is_refused() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "Temp");
    create_db(temp.path(), &[("a", "Alpha", "Alpha")]);

    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .args(["export", "--json"])
        .assert()
        .failure()
        .code(9)
        .stderr(predicate::str::contains("UNSAFE_PATH"));
}

#[test]
fn test_check_lists_changed_files() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "Temp/BearExportTemp");
    let export = temp.path().join("BearNotes");

    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("No previous export"));

    let now = SystemTime::now();
    SyncMarkers::new(&export)
        .write_both(now - Duration::from_secs(60))
        .unwrap();
    write_with_mtime(&export.join("work/Plan.md"), "Plan\nedited", now).unwrap();
    write_with_mtime(&export.join("work/old.md"), "old", now - Duration::from_secs(600)).unwrap();

    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan.md"))
        .stdout(predicate::str::contains("old.md").not());

    // Checking does not consume the change
    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .args(["check", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan.md"));
}

#[test]
fn test_export_writes_notes_and_markers() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "Temp/BearExportTemp");
    create_db(temp.path(), &[("abc123", "Groceries", "Groceries\nBuy milk\n#.inbox")]);
    let export = temp.path().join("BearNotes");

    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .arg("export")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 notes exported"));

    let note = fs::read_to_string(export.join("_inbox/Groceries.md")).unwrap();
    assert!(note.contains("Buy milk"));
    assert!(note.contains("{NoteID:abc123}"));
    assert!(SyncMarkers::new(&export).has_baseline());
}

#[test]
fn test_export_refuses_to_overwrite_unsynced_edits() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "Temp/BearExportTemp");
    create_db(temp.path(), &[("abc123", "Groceries", "Groceries\nBuy milk\n#.inbox")]);
    let export = temp.path().join("BearNotes");

    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .arg("export")
        .assert()
        .success();

    let now = SystemTime::now();
    SyncMarkers::new(&export)
        .write_both(now - Duration::from_secs(60))
        .unwrap();
    let loose = export.join("Ideas/Loose.md");
    write_with_mtime(&loose, "Loose\nnot in Bear yet", now).unwrap();

    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .args(["export", "--json"])
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("PENDING_EDITS"));
    assert!(loose.exists());

    bearsync_cmd()
        .arg("--config")
        .arg(&config)
        .args(["export", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unsynced edits backed up"));

    assert!(!loose.exists());
    let backup = fs::read_to_string(temp.path().join("BearSyncBackup/Loose.md")).unwrap();
    assert!(backup.contains("not in Bear yet"));
}
