//! CLI integration tests for mysql-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that occur before any connection.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mysql-pg-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("mysql-pg-migrate").unwrap()
}

/// A complete config whose databases are never reached by these tests.
fn write_config(extra: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"source:
  host: mysql.invalid
  database: shop
  user: reader
target:
  host: pg.invalid
  database: warehouse
  user: writer
{}"#,
        extra
    )
    .unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--chunk-size"))
        .stdout(predicate::str::contains("--recreate"))
        .stdout(predicate::str::contains("--truncate"))
        .stdout(predicate::str::contains("--yes"));
}

#[test]
fn test_plan_subcommand_help() {
    cmd()
        .args(["plan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("without changing the target"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mysql-pg-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_progress_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--progress"));
}

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  host: localhost").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_unknown_ssl_mode_exits_with_code_1() {
    let file = write_config("migration:\n  chunk_size: 500\n");
    let mut contents = std::fs::read_to_string(file.path()).unwrap();
    contents = contents.replace("  user: writer", "  user: writer\n  ssl_mode: sometimes");
    std::fs::write(file.path(), contents).unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "plan"])
        .assert()
        .code(1);
}

#[test]
fn test_zero_chunk_size_override_exits_with_code_1() {
    let file = write_config("");

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "run",
            "--chunk-size",
            "0",
            "--yes",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("chunk_size"));
}

#[test]
fn test_same_endpoint_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"source:
  host: db.internal
  port: 5432
  database: shop
  user: reader
target:
  host: db.internal
  database: shop
  user: writer"#
    )
    .unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test database connections"));
}

#[test]
fn test_validate_command_exists() {
    cmd()
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validate row counts"));
}

// =============================================================================
// Config Path Tests
// =============================================================================

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    // -c should work as short for --config
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
