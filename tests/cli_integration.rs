//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end. None of these tests reach
//! the network or need a scanner installed.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Get the binary to test.
fn plugscan() -> Command {
    let mut cmd = Command::cargo_bin("plugscan").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("PLUGSCAN_CONFIG");
    cmd
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    plugscan()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download, scan and triage plugins"));
}

#[test]
fn test_version_flag() {
    plugscan()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_run_help_lists_modes() {
    plugscan()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("audit"))
        .stdout(predicate::str::contains("both"))
        .stdout(predicate::str::contains("--active-installs"));
}

#[test]
fn test_run_rejects_unknown_mode() {
    plugscan().args(["run", "--mode", "scan"]).assert().failure();
}

// ============================================================================
// Run Command Tests
// ============================================================================

#[test]
fn test_audit_empty_download_dir() {
    let temp = assert_fs::TempDir::new().unwrap();

    plugscan()
        .current_dir(temp.path())
        .args(["run", "--mode", "audit", "--no-drift-check", "-d"])
        .arg(temp.path())
        .assert()
        .success();

    temp.child("plugscan.db").assert(predicate::path::exists());
}

#[test]
fn test_audit_with_explicit_database() {
    let temp = assert_fs::TempDir::new().unwrap();
    let db = temp.child("ledger/audit.db");

    plugscan()
        .current_dir(temp.path())
        .args(["run", "-m", "audit", "--no-drift-check", "--clear-results", "-o"])
        .arg(db.path())
        .assert()
        .success();

    db.assert(predicate::path::exists());
}

#[test]
fn test_missing_config_file_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    plugscan()
        .current_dir(temp.path())
        .args(["--config-file", "missing.toml", "plugins"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml"));
}

#[test]
fn test_config_file_sets_download_dir() {
    let temp = assert_fs::TempDir::new().unwrap();
    let data = temp.child("data");
    data.create_dir_all().unwrap();
    let config = temp.child("plugscan.toml");
    config
        .write_str(&format!("[paths]\ndownload_dir = {:?}\n", data.path().display().to_string()))
        .unwrap();

    plugscan()
        .current_dir(temp.path())
        .arg("--config-file")
        .arg(config.path())
        .args(["run", "-m", "audit", "--no-drift-check"])
        .assert()
        .success();

    data.child("plugscan.db").assert(predicate::path::exists());
}

// ============================================================================
// Ledger Command Tests
// ============================================================================

/// Create an empty ledger in `dir` through an audit run.
fn init_ledger(dir: &std::path::Path) {
    plugscan()
        .current_dir(dir)
        .args(["run", "-m", "audit", "--no-drift-check", "-d"])
        .arg(dir)
        .assert()
        .success();
}

#[test]
fn test_findings_without_ledger_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    plugscan()
        .current_dir(temp.path())
        .arg("findings")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No ledger at"));

    temp.child("plugscan.db").assert(predicate::path::missing());
}

#[test]
fn test_findings_locates_ledger_by_download_dir() {
    let temp = assert_fs::TempDir::new().unwrap();
    let work = temp.child("work");
    work.create_dir_all().unwrap();
    init_ledger(work.path());

    plugscan()
        .current_dir(temp.path())
        .arg("findings")
        .arg("-d")
        .arg(work.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No findings"));

    temp.child("plugscan.db").assert(predicate::path::missing());
}

#[test]
fn test_findings_json_on_empty_ledger() {
    let temp = assert_fs::TempDir::new().unwrap();
    init_ledger(temp.path());

    plugscan()
        .current_dir(temp.path())
        .args(["findings", "--format", "json", "--untriaged"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn test_plugins_json_on_empty_ledger() {
    let temp = assert_fs::TempDir::new().unwrap();
    init_ledger(temp.path());

    plugscan()
        .current_dir(temp.path())
        .args(["plugins", "--format", "json", "-o"])
        .arg(temp.child("plugscan.db").path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn test_triage_unknown_finding() {
    let temp = assert_fs::TempDir::new().unwrap();
    init_ledger(temp.path());

    plugscan()
        .current_dir(temp.path())
        .args(["triage", "acme-forms", "1.1", "form.php", "php.xss", "4", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No finding matches"));
}

#[test]
fn test_triage_requires_line_numbers() {
    plugscan().args(["triage", "acme-forms", "1.1", "form.php", "php.xss"]).assert().failure();
}

// ============================================================================
// Completions Tests
// ============================================================================

#[test]
fn test_bash_completions() {
    plugscan()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plugscan"));
}
