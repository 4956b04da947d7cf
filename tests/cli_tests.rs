use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("modeflow.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_cli_help() {
    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Confidence-routed mode engine"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("route"))
        .stdout(predicate::str::contains("modes"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_cli_version() {
    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("modeflow"));
}

#[test]
fn test_cli_config_help() {
    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_route_keyword_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.current_dir(dir.path())
        .env_remove("MODEFLOW_CONFIG")
        .args(["route", "fix the crash in this function"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Winner: debugging"));
}

#[test]
fn test_route_json_uses_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.current_dir(dir.path())
        .env_remove("MODEFLOW_CONFIG")
        .args(["--output", "json", "route", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""winner": "general""#))
        .stdout(predicate::str::contains(r#""used_fallback": true"#));
}

#[test]
fn test_modes_lists_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.current_dir(dir.path())
        .env_remove("MODEFLOW_CONFIG")
        .arg("modes")
        .assert()
        .success()
        .stdout(predicate::str::contains("general"))
        .stdout(predicate::str::contains("debugging"))
        .stdout(predicate::str::contains("reflecting"));
}

#[test]
fn test_chat_reads_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.current_dir(dir.path())
        .env_remove("MODEFLOW_CONFIG")
        .args(["--output", "json", "chat", "--session", "t1"])
        .write_stdin("fix the crash in this function\nhello\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""mode_id":"debugging""#))
        .stdout(predicate::str::contains(r#""mode_id":"general""#));
}

#[test]
fn test_config_validate_custom_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[[modes]]
id = "chat"
fallback = true
"#,
    );

    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.arg("--config")
        .arg(&path)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid (1 modes)"));
}

#[test]
fn test_config_validate_reports_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[router]
activation_threshold = 3.0
"#,
    );

    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.env("MODEFLOW_CONFIG", &path)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("activation_threshold"));
}

#[test]
fn test_config_show_json() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.current_dir(dir.path())
        .env_remove("MODEFLOW_CONFIG")
        .args(["-o", "json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""scoring_timeout_ms": 250"#));
}

#[test]
fn test_chat_reset_forgets_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.current_dir(dir.path())
        .env_remove("MODEFLOW_CONFIG")
        .args(["--output", "json", "chat", "--session", "t1"])
        .write_stdin("fix the crash in this function\n/reset\n/history\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"reset":true}"#))
        .stdout(predicate::str::contains("\n[]\n"));
}

#[test]
fn test_config_init_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf").join("modeflow.toml");

    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default configuration"));
    assert!(path.exists());

    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.arg("--config")
        .arg(&path)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid (7 modes)"));

    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    let mut cmd = cargo_bin_cmd!("modeflow");
    cmd.arg("--config")
        .arg(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}
