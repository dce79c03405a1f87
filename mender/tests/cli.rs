//! CLI tests for the `mender` binary.
//!
//! Spawns the binary in a temp directory and checks exit codes and the
//! artifacts each command leaves behind.

use std::path::Path;
use std::process::{Command, Output};

use mender::exit_codes;
use serde_json::Value;

fn mender(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mender"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("spawn mender")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn field<'a>(text: &'a str, name: &str) -> &'a str {
    let prefix = format!("{name}: ");
    text.lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .unwrap_or_else(|| panic!("missing {name} in output:\n{text}"))
}

#[test]
fn init_writes_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");

    let first = mender(temp.path(), &["init"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join("mender.toml").exists());

    let second = mender(temp.path(), &["init"]);
    assert_eq!(second.status.code(), Some(exit_codes::INVALID));

    let forced = mender(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn tools_prints_the_catalog() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = mender(temp.path(), &["tools"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let catalog: Value = serde_json::from_str(&stdout(&output)).expect("json");
    let names: Vec<&str> = catalog
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert!(names.contains(&"kill_process"));
    assert!(names.contains(&"mission_complete"));
    assert_eq!(
        catalog[1]["parameters"]["pid"]["type"],
        Value::String("integer".to_string())
    );
}

#[test]
fn simulated_run_resolves_and_its_audit_verifies() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = mender(
        temp.path(),
        &["run", "--simulate", "find the process using the most memory"],
    );
    let text = stdout(&output);
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{text}");
    assert_eq!(field(&text, "status"), "Resolved");
    assert!(text.contains("== cycle 1/10 =="));

    let audit = field(&text, "audit").to_string();
    let hash = field(&text, "sha256").to_string();
    let verified = mender(temp.path(), &["verify", &audit, "--expect", &hash]);
    assert_eq!(verified.status.code(), Some(exit_codes::OK));
    assert!(stdout(&verified).starts_with("ok: Resolved"));

    let mismatch = mender(temp.path(), &["verify", &audit, "--expect", "00ff"]);
    assert_eq!(mismatch.status.code(), Some(exit_codes::INVALID));

    let lessons = mender(temp.path(), &["lessons"]);
    assert!(stdout(&lessons).contains("Top memory consumer is stress-ng-vm"));
}

#[test]
fn simulated_run_without_progress_exits_halted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = mender(
        temp.path(),
        &["run", "--simulate", "--max-cycles", "2", "water the plants"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::HALTED));
    assert_eq!(field(&stdout(&output), "status"), "Halted");
}

#[test]
fn missing_gemini_key_fails_over_to_simulation() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        temp.path().join("mender.toml"),
        "max_cycles = 1\n\n[transport]\nkind = \"local\"\n\n[backend]\nkind = \"gemini\"\napi_key_env = \"MENDER_TEST_MISSING_KEY\"\n",
    )
    .expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_mender"))
        .current_dir(temp.path())
        .env_remove("RUST_LOG")
        .env_remove("MENDER_TEST_MISSING_KEY")
        .args(["run", "find the process using the most memory"])
        .output()
        .expect("spawn mender");
    let text = stdout(&output);

    assert_eq!(output.status.code(), Some(exit_codes::HALTED), "{text}");
    assert!(
        text.contains("! live backend unavailable (no live backend configured)"),
        "{text}"
    );
    assert_eq!(field(&text, "status"), "Halted");
}
