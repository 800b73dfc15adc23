use std::fs;
use std::process::{Command, Output};

use tempfile::TempDir;

fn tessera(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tessera"))
        .args(args)
        .output()
        .expect("Failed to run the tessera binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_spawn_joins_in_order() {
    let output = tessera(&["spawn", "-n", "10"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines.len(), 10);
    for (index, line) in lines.iter().enumerate() {
        assert!(line.starts_with("#<Thread:0x"), "unexpected line: {}", line);
        assert!(line.contains(" dead> "), "unexpected line: {}", line);
        assert!(line.contains(&format!("value={} ", index)), "unexpected line: {}", line);
    }
}

#[test]
fn test_probe_reports_both_extents() {
    let output = tessera(&["probe"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    assert!(out.contains("discovered (probe): 0x"), "stdout: {}", out);
    assert!(out.contains("os-reported:"), "stdout: {}", out);
}

#[test]
fn test_threads_lists_main_and_parked_threads() {
    let output = tessera(&["threads", "-n", "3"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    assert!(out.starts_with("4 live thread object(s)"), "stdout: {}", out);
    assert_eq!(out.matches(" main run").count(), 1);
    assert_eq!(out.matches(" spawned ").count(), 3);
}

#[test]
fn test_config_file_sets_stack_size() {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let path = dir.path().join("tessera.toml");
    fs::write(&path, "[runtime]\nstack_size = 262144\nbootstrap_stack = \"query\"\n")
        .expect("Failed to write config file");

    let output = tessera(&["--config", path.to_str().unwrap(), "spawn", "-n", "1"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    let size: usize = out
        .split('(')
        .nth(1)
        .and_then(|rest| rest.split(' ').next())
        .and_then(|bytes| bytes.parse().ok())
        .expect("extent size in output");
    assert!(size <= 262144, "stdout: {}", out);
}

#[test]
fn test_bad_config_file_is_a_diagnostic() {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let path = dir.path().join("tessera.toml");
    fs::write(&path, "[runtime]\nbootstrap_stack = 3\n").expect("Failed to write config file");

    let output = tessera(&["--config", path.to_str().unwrap(), "threads"]);
    assert!(!output.status.success());
    let err = String::from_utf8_lossy(&output.stderr);
    assert!(err.contains("Invalid config file"), "stderr: {}", err);
}
