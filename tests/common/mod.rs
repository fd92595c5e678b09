#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const LOG_ENV: &str = "CRASHRECOVER_LOG";

/// Spawn the binary with `args`. `log_filter` sets the log level; without
/// one the variable is cleared so the caller's environment cannot leak in.
fn spawn(args: &[&str], log_filter: Option<&str>) -> (i32, String, String) {
    let mut command = Command::new(env!("CARGO_BIN_EXE_crashrecover"));
    command.args(args);
    match log_filter {
        Some(filter) => command.env(LOG_ENV, filter),
        None => command.env_remove(LOG_ENV),
    };
    let output = command.output().expect("failed to spawn binary");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

pub fn run_cli(args: &[&str]) -> (i32, String, String) {
    spawn(args, None)
}

pub fn run_cli_with_log(args: &[&str], filter: &str) -> (i32, String, String) {
    spawn(args, Some(filter))
}

/// Run the binary and parse its stdout as JSON, asserting success.
pub fn run_json(args: &[&str]) -> Value {
    let (code, stdout, stderr) = run_cli(args);
    assert_eq!(code, 0, "stderr: {stderr}");
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad JSON ({e}): {stdout}"))
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// One object per line, the way a conversation log is streamed to disk.
pub fn streamed_array(messages: &[Value]) -> String {
    let body = messages
        .iter()
        .map(|m| serde_json::to_string(m).unwrap())
        .collect::<Vec<_>>()
        .join(",\n");
    format!("[\n{body}\n]\n")
}

pub fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}
