//! Integration tests for the --validate CLI mode.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn herald_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_herald"))
}

fn run_validate(config: &std::path::Path) -> std::process::Output {
    Command::new(herald_binary())
        .args(["--validate", "-c"])
        .arg(config)
        .env_remove("LOG_FORMAT")
        .output()
        .expect("Failed to run herald")
}

#[test]
fn validate_valid_config_exits_success() {
    let output = run_validate(&fixture_path("config_valid.yaml"));

    assert!(
        output.status.success(),
        "herald --validate should exit with code 0 for valid config\nstderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Configuration is valid"),
        "Output should indicate valid config: {}",
        stdout
    );
    assert!(
        stdout.contains("SMTP relay: mail.example.com:25"),
        "Output should show the relay: {}",
        stdout
    );
    assert!(
        stdout.contains("Notifications: 3 (hook, ops, ping)"),
        "Output should list notifications: {}",
        stdout
    );
    assert!(
        stdout.contains("Server header: monitor-01"),
        "Output should show the server header value: {}",
        stdout
    );
}

#[test]
fn validate_minimal_config_has_no_relay() {
    let output = run_validate(&fixture_path("config_minimal.yaml"));

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("SMTP relay: none"), "stdout: {}", stdout);
    assert!(stdout.contains("Metrics: disabled (port 9090)"), "stdout: {}", stdout);
}

#[test]
fn validate_invalid_config_exits_failure() {
    let output = run_validate(&fixture_path("config_invalid.yaml"));

    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("broken_email"),
        "Error message should mention the broken notification: {}",
        stderr
    );
    assert!(stderr.contains("no_channel"), "stderr: {}", stderr);
    assert!(stderr.contains("bad_template"), "stderr: {}", stderr);
}

#[test]
fn validate_invalid_yaml_exits_failure() {
    let output = run_validate(&fixture_path("config_invalid_yaml.yaml"));
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn validate_nonexistent_file_exits_failure() {
    let output = run_validate(std::path::Path::new("/nonexistent/herald.yaml"));

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load configuration"), "stderr: {}", stderr);
}

#[test]
fn validate_reports_compile_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "notifications:\n  hook:\n    post: https://hooks.example.com\n    body_file: missing.j2"
    )
    .unwrap();

    let output = run_validate(file.path());

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("body_file not found"), "stderr: {}", stderr);
}

#[test]
fn run_prints_incidents_from_file() {
    let mut incidents = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        incidents,
        r#"{{"alert_key": "k1", "subject": "Queue backlog", "body": "depth 10k", "notifications": ["console"]}}"#
    )
    .unwrap();

    let output = Command::new(herald_binary())
        .arg("-c")
        .arg(fixture_path("config_minimal.yaml"))
        .arg("-i")
        .arg(incidents.path())
        .env_remove("LOG_FORMAT")
        .output()
        .expect("Failed to run herald");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {}", stderr);
    assert!(stderr.contains("Queue backlog"), "stderr: {}", stderr);
    assert!(stderr.contains("herald shutdown complete"), "stderr: {}", stderr);
}
