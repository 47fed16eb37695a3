//! Integration tests for the swrcache binary
//!
//! Runs the compiled CLI against temporary cache directories. Endpoints point
//! at a closed local port so no test depends on the network.

use std::process::Command;

use chrono::Utc;
use tempfile::TempDir;

use swrcache::cache::{CacheEntry, EntryStore, FileStore};

/// Nothing listens on the discard port, so requests fail fast
const UNREACHABLE_URL: &str = "http://127.0.0.1:9/products/latest";

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_swrcache"))
        .args(args)
        .output()
        .expect("Failed to execute swrcache")
}

fn seed_entry(dir: &TempDir, key: &str, value: serde_json::Value, age_ms: i64, ttl_ms: u64) {
    let store = EntryStore::new(
        std::sync::Arc::new(FileStore::with_dir(dir.path())),
        "swc:",
    );
    let stored_at = Utc::now().timestamp_millis() - age_ms;
    store.write(key, &CacheEntry::new(value, stored_at, ttl_ms));
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("swrcache"), "Help should mention swrcache");
    assert!(stdout.contains("fetch"), "Help should list the fetch command");
    assert!(stdout.contains("inspect"), "Help should list the inspect command");
}

#[test]
fn test_zero_ttl_is_rejected() {
    let output = run_cli(&["fetch", UNREACHABLE_URL, "--ttl-ms", "0"]);
    assert!(!output.status.success(), "Expected zero TTL to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid TTL"),
        "Should print error message about the TTL: {}",
        stderr
    );
}

#[test]
fn test_inspect_missing_entry_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&["--cache-dir", dir, "inspect", "home:latest"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No usable entry"), "stderr: {}", stderr);
}

#[test]
fn test_inspect_reports_persisted_entry() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    seed_entry(&temp_dir, "home:latest", serde_json::json!(["A", "B"]), 1_000, 60_000);
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&["--cache-dir", dir, "inspect", "home:latest"]);

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("inspect prints JSON");
    assert_eq!(report["value"], serde_json::json!(["A", "B"]));
    assert_eq!(report["ttlMs"], 60_000);
    assert_eq!(report["fresh"], true);
    assert_eq!(report["storageKey"], "swc:home:latest");
}

#[test]
fn test_fetch_cold_miss_with_unreachable_endpoint_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&["--cache-dir", dir, "fetch", UNREACHABLE_URL]);

    assert!(!output.status.success(), "cold miss must surface the load error");
    assert!(output.stdout.is_empty());
    assert_eq!(
        std::fs::read_dir(temp_dir.path()).map(|d| d.count()).unwrap_or(0),
        0,
        "nothing is persisted after a failed load"
    );
}

#[test]
fn test_fetch_serves_fresh_persisted_entry_despite_unreachable_endpoint() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    seed_entry(&temp_dir, "home:latest", serde_json::json!({"items": [1, 2]}), 500, 60_000);
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&[
        "--cache-dir",
        dir,
        "fetch",
        UNREACHABLE_URL,
        "--key",
        "home:latest",
    ]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("fetch prints JSON");
    assert_eq!(value, serde_json::json!({"items": [1, 2]}));
}

#[test]
fn test_fetch_ignores_expired_entry() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    seed_entry(&temp_dir, "home:latest", serde_json::json!("stale"), 10_000, 5_000);
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&[
        "--cache-dir",
        dir,
        "fetch",
        UNREACHABLE_URL,
        "--key",
        "home:latest",
    ]);

    assert!(!output.status.success(), "expired entry is not served");
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use swrcache::cli::{parse_ttl_arg, Cli, Command, DEFAULT_TTL_MS};

    #[test]
    fn test_cli_fetch_key_defaults_to_none() {
        let cli = Cli::parse_from(["swrcache", "fetch", "http://localhost/x"]);
        match cli.command {
            Command::Fetch { key, ttl_ms, .. } => {
                assert!(key.is_none());
                assert_eq!(ttl_ms, DEFAULT_TTL_MS);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["swrcache"]).is_err());
    }

    #[test]
    fn test_parse_ttl_arg_round_numbers() {
        assert_eq!(parse_ttl_arg("60000").unwrap(), 60_000);
        assert!(parse_ttl_arg("1.5").is_err());
    }
}
